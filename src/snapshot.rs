//! Binary argument snapshot for zero-allocation log capture
//!
//! A `Snapshot` records a log call's format template and arguments into a
//! fixed 256-byte buffer as tagged binary records, so the hot path never
//! touches the heap. The layout is a 2-byte little-endian argument count
//! followed by `{1-byte tag, payload}` records:
//!
//! ```text
//! +------------------+
//! | arg_count (2B)   |
//! +------------------+
//! | tag[0] (1B)      |
//! | payload[0] (var) |
//! +------------------+
//! | tag[1] (1B)      |
//! | payload[1] (var) |
//! +------------------+
//! | ...              |
//! ```
//!
//! Static strings are captured as a borrowed pointer + length (`StringView`);
//! dynamic strings are copied inline (`StringCopy`). Borrowed views are only
//! valid until the snapshot is consumed in-process or rewritten by
//! [`Snapshot::convert_borrowed_to_inline`] before crossing a process
//! boundary.

use crate::constants::{ SNAPSHOT_CAPACITY, SNAPSHOT_HEADER_SIZE };

/// Type tag identifying the payload of one captured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    /// i32 (4B)
    Int32 = 0x01,
    /// i64 (8B)
    Int64 = 0x02,
    /// u32 (4B)
    UInt32 = 0x03,
    /// u64 (8B)
    UInt64 = 0x04,
    /// f32 (4B)
    Float = 0x05,
    /// f64 (8B)
    Double = 0x06,
    /// bool (1B, 0 or 1)
    Bool = 0x07,
    /// Borrowed string: 8B pointer + 4B length. In-process only.
    StringView = 0x10,
    /// Inline string copy: 2B length + bytes.
    StringCopy = 0x11,
    /// Raw pointer value (8B), rendered in hex.
    Pointer = 0x20,
}

impl TypeTag {
    pub fn from_u8(value: u8) -> Option<TypeTag> {
        match value {
            0x01 => Some(TypeTag::Int32),
            0x02 => Some(TypeTag::Int64),
            0x03 => Some(TypeTag::UInt32),
            0x04 => Some(TypeTag::UInt64),
            0x05 => Some(TypeTag::Float),
            0x06 => Some(TypeTag::Double),
            0x07 => Some(TypeTag::Bool),
            0x10 => Some(TypeTag::StringView),
            0x11 => Some(TypeTag::StringCopy),
            0x20 => Some(TypeTag::Pointer),
            _ => None,
        }
    }
}

/// One log argument, borrowed from the call site.
///
/// `View` records the pointer and length without copying; the referent must
/// stay alive until the snapshot is consumed or converted. `Str` copies the
/// bytes inline.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    View(&'static str),
    Str(&'a str),
    Ptr(usize),
}

/// Conversion into [`Arg`] used by the logging macros.
pub trait ToArg {
    fn to_arg(&self) -> Arg<'_>;
}

impl ToArg for i32 {
    fn to_arg(&self) -> Arg<'_> {
        Arg::I32(*self)
    }
}
impl ToArg for i64 {
    fn to_arg(&self) -> Arg<'_> {
        Arg::I64(*self)
    }
}
impl ToArg for u32 {
    fn to_arg(&self) -> Arg<'_> {
        Arg::U32(*self)
    }
}
impl ToArg for u64 {
    fn to_arg(&self) -> Arg<'_> {
        Arg::U64(*self)
    }
}
impl ToArg for usize {
    fn to_arg(&self) -> Arg<'_> {
        Arg::U64(*self as u64)
    }
}
impl ToArg for f32 {
    fn to_arg(&self) -> Arg<'_> {
        Arg::F32(*self)
    }
}
impl ToArg for f64 {
    fn to_arg(&self) -> Arg<'_> {
        Arg::F64(*self)
    }
}
impl ToArg for bool {
    fn to_arg(&self) -> Arg<'_> {
        Arg::Bool(*self)
    }
}
impl ToArg for str {
    fn to_arg(&self) -> Arg<'_> {
        Arg::Str(self)
    }
}
impl ToArg for &str {
    fn to_arg(&self) -> Arg<'_> {
        Arg::Str(*self)
    }
}
impl ToArg for String {
    fn to_arg(&self) -> Arg<'_> {
        Arg::Str(self.as_str())
    }
}
impl<T> ToArg for *const T {
    fn to_arg(&self) -> Arg<'_> {
        Arg::Ptr(*self as usize)
    }
}

/// Fixed-capacity binary snapshot of a log call's arguments.
///
/// Capture is O(argument count) with no heap traffic. All captures return
/// `false` on overflow and leave the snapshot unchanged, so a record is still
/// publishable with the arguments accumulated so far.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Snapshot {
    buf: [u8; SNAPSHOT_CAPACITY],
    offset: u16,
    arg_count: u16,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self {
            buf: [0u8; SNAPSHOT_CAPACITY],
            offset: SNAPSHOT_HEADER_SIZE as u16,
            arg_count: 0,
        }
    }

    pub fn arg_count(&self) -> u16 {
        self.arg_count
    }

    /// Bytes used so far, including the 2-byte header.
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub const fn capacity() -> usize {
        SNAPSHOT_CAPACITY
    }

    pub fn remaining(&self) -> usize {
        SNAPSHOT_CAPACITY - self.offset as usize
    }

    pub fn is_empty(&self) -> bool {
        self.arg_count == 0
    }

    /// The full fixed-size buffer, as written to the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn reset(&mut self) {
        self.buf[..SNAPSHOT_HEADER_SIZE].fill(0);
        self.offset = SNAPSHOT_HEADER_SIZE as u16;
        self.arg_count = 0;
    }

    // =========================================================================
    // Capture
    // =========================================================================

    pub fn capture_i32(&mut self, value: i32) -> bool {
        self.capture_raw(TypeTag::Int32, &value.to_le_bytes())
    }

    pub fn capture_i64(&mut self, value: i64) -> bool {
        self.capture_raw(TypeTag::Int64, &value.to_le_bytes())
    }

    pub fn capture_u32(&mut self, value: u32) -> bool {
        self.capture_raw(TypeTag::UInt32, &value.to_le_bytes())
    }

    pub fn capture_u64(&mut self, value: u64) -> bool {
        self.capture_raw(TypeTag::UInt64, &value.to_le_bytes())
    }

    pub fn capture_f32(&mut self, value: f32) -> bool {
        self.capture_raw(TypeTag::Float, &value.to_le_bytes())
    }

    pub fn capture_f64(&mut self, value: f64) -> bool {
        self.capture_raw(TypeTag::Double, &value.to_le_bytes())
    }

    pub fn capture_bool(&mut self, value: bool) -> bool {
        self.capture_raw(TypeTag::Bool, &[u8::from(value)])
    }

    pub fn capture_ptr(&mut self, value: usize) -> bool {
        self.capture_raw(TypeTag::Pointer, &(value as u64).to_le_bytes())
    }

    /// Capture a static string zero-copy as pointer + length.
    ///
    /// The `'static` bound keeps the in-process read safe; for cross-process
    /// transport the view must first be rewritten by
    /// [`Snapshot::convert_borrowed_to_inline`].
    pub fn capture_view(&mut self, value: &'static str) -> bool {
        self.capture_view_raw(value.as_ptr(), value.len())
    }

    /// Capture a string by copying its bytes inline (2-byte length prefix).
    pub fn capture_str(&mut self, value: &str) -> bool {
        let len = value.len().min(u16::MAX as usize);
        let needed = 1 + 2 + len;
        if self.remaining() < needed {
            return false;
        }
        let mut off = self.offset as usize;
        self.buf[off] = TypeTag::StringCopy as u8;
        off += 1;
        self.buf[off..off + 2].copy_from_slice(&(len as u16).to_le_bytes());
        off += 2;
        self.buf[off..off + len].copy_from_slice(&value.as_bytes()[..len]);
        off += len;
        self.offset = off as u16;
        self.bump_arg_count();
        true
    }

    /// Capture one argument with type-directed tag selection.
    pub fn capture(&mut self, arg: Arg<'_>) -> bool {
        match arg {
            Arg::I32(v) => self.capture_i32(v),
            Arg::I64(v) => self.capture_i64(v),
            Arg::U32(v) => self.capture_u32(v),
            Arg::U64(v) => self.capture_u64(v),
            Arg::F32(v) => self.capture_f32(v),
            Arg::F64(v) => self.capture_f64(v),
            Arg::Bool(v) => self.capture_bool(v),
            Arg::View(v) => self.capture_view(v),
            Arg::Str(v) => self.capture_str(v),
            Arg::Ptr(v) => self.capture_ptr(v),
        }
    }

    /// Capture a sequence of arguments; stops at the first overflow.
    ///
    /// Returns `true` only if every argument fit.
    pub fn capture_many(&mut self, args: &[Arg<'_>]) -> bool {
        for arg in args {
            if !self.capture(*arg) {
                return false;
            }
        }
        true
    }

    fn capture_raw(&mut self, tag: TypeTag, payload: &[u8]) -> bool {
        let needed = 1 + payload.len();
        if self.remaining() < needed {
            return false;
        }
        let mut off = self.offset as usize;
        self.buf[off] = tag as u8;
        off += 1;
        self.buf[off..off + payload.len()].copy_from_slice(payload);
        off += payload.len();
        self.offset = off as u16;
        self.bump_arg_count();
        true
    }

    fn capture_view_raw(&mut self, ptr: *const u8, len: usize) -> bool {
        const NEEDED: usize = 1 + 8 + 4;
        if self.remaining() < NEEDED {
            return false;
        }
        let mut off = self.offset as usize;
        self.buf[off] = TypeTag::StringView as u8;
        off += 1;
        self.buf[off..off + 8].copy_from_slice(&(ptr as u64).to_le_bytes());
        off += 8;
        self.buf[off..off + 4].copy_from_slice(&(len as u32).to_le_bytes());
        off += 4;
        self.offset = off as u16;
        self.bump_arg_count();
        true
    }

    fn bump_arg_count(&mut self) {
        self.arg_count += 1;
        self.buf[..SNAPSHOT_HEADER_SIZE].copy_from_slice(&self.arg_count.to_le_bytes());
    }

    // =========================================================================
    // Formatting
    // =========================================================================

    /// Render the captured records into `template`, consuming one record per
    /// `{}` placeholder. Literal characters are copied verbatim; surplus
    /// placeholders are left empty.
    pub fn format_with(&self, template: &str) -> String {
        let mut result = String::with_capacity(SNAPSHOT_CAPACITY);
        let mut offset = SNAPSHOT_HEADER_SIZE;
        let mut arg_index = 0u16;
        self.render_template(template, &mut result, &mut offset, &mut arg_index);
        result
    }

    /// Treat the first captured record as the format template and render the
    /// remainder into it. Falls back to space-separated concatenation when the
    /// first record is not a string.
    pub fn format_all(&self) -> String {
        if self.arg_count == 0 {
            return String::new();
        }

        let mut offset = SNAPSHOT_HEADER_SIZE;
        if let Some(template) = self.read_string_record(&mut offset) {
            if self.arg_count == 1 {
                return template;
            }
            let mut result = String::with_capacity(SNAPSHOT_CAPACITY);
            let mut arg_index = 1u16;
            self.render_template(&template, &mut result, &mut offset, &mut arg_index);
            return result;
        }

        // First record is not a string: space-separated fallback.
        let mut result = String::with_capacity(SNAPSHOT_CAPACITY);
        let mut offset = SNAPSHOT_HEADER_SIZE;
        for i in 0..self.arg_count {
            if offset >= self.offset as usize {
                break;
            }
            if i > 0 {
                result.push(' ');
            }
            if !self.format_arg(&mut result, &mut offset) {
                break;
            }
        }
        result
    }

    fn render_template(
        &self,
        template: &str,
        result: &mut String,
        offset: &mut usize,
        arg_index: &mut u16
    ) {
        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'}' {
                if *arg_index < self.arg_count && *offset < (self.offset as usize) {
                    if self.format_arg(result, offset) {
                        *arg_index += 1;
                    }
                }
                i += 2;
            } else {
                // Copy one UTF-8 scalar worth of bytes.
                let ch_len = utf8_len(bytes[i]);
                let end = (i + ch_len).min(bytes.len());
                result.push_str(&template[i..end]);
                i = end;
            }
        }
    }

    /// Read a `StringView` or `StringCopy` record at `offset` as an owned
    /// string. Returns `None` for any other tag or a truncated record.
    fn read_string_record(&self, offset: &mut usize) -> Option<String> {
        let tag = TypeTag::from_u8(*self.buf.get(*offset)?)?;
        match tag {
            TypeTag::StringView => {
                if *offset + 13 > self.offset as usize {
                    return None;
                }
                let (ptr, len) = self.decode_view(*offset + 1);
                *offset += 13;
                Some(view_to_string(ptr, len))
            }
            TypeTag::StringCopy => {
                let start = *offset + 1;
                if start + 2 > self.offset as usize {
                    return None;
                }
                let len = u16::from_le_bytes([self.buf[start], self.buf[start + 1]]) as usize;
                if start + 2 + len > self.offset as usize {
                    return None;
                }
                let s = String::from_utf8_lossy(&self.buf[start + 2..start + 2 + len]).into_owned();
                *offset = start + 2 + len;
                Some(s)
            }
            _ => None,
        }
    }

    fn decode_view(&self, at: usize) -> (u64, u32) {
        let mut ptr_bytes = [0u8; 8];
        ptr_bytes.copy_from_slice(&self.buf[at..at + 8]);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.buf[at + 8..at + 12]);
        (u64::from_le_bytes(ptr_bytes), u32::from_le_bytes(len_bytes))
    }

    /// Decode one record at `offset` and append its rendering to `result`.
    /// Returns `false` if the record is truncated or has an unknown tag.
    fn format_arg(&self, result: &mut String, offset: &mut usize) -> bool {
        use std::fmt::Write as _;

        let end = self.offset as usize;
        let Some(tag) = self.buf.get(*offset).copied().and_then(TypeTag::from_u8) else {
            return false;
        };
        let mut at = *offset + 1;

        macro_rules! take {
            ($n:expr) => {{
                if at + $n > end {
                    return false;
                }
                let slice = &self.buf[at..at + $n];
                at += $n;
                slice
            }};
        }

        match tag {
            TypeTag::Int32 => {
                let v = i32::from_le_bytes(take!(4).try_into().unwrap());
                let _ = write!(result, "{v}");
            }
            TypeTag::Int64 => {
                let v = i64::from_le_bytes(take!(8).try_into().unwrap());
                let _ = write!(result, "{v}");
            }
            TypeTag::UInt32 => {
                let v = u32::from_le_bytes(take!(4).try_into().unwrap());
                let _ = write!(result, "{v}");
            }
            TypeTag::UInt64 => {
                let v = u64::from_le_bytes(take!(8).try_into().unwrap());
                let _ = write!(result, "{v}");
            }
            TypeTag::Float => {
                let v = f32::from_le_bytes(take!(4).try_into().unwrap());
                let _ = write!(result, "{v:.6}");
            }
            TypeTag::Double => {
                let v = f64::from_le_bytes(take!(8).try_into().unwrap());
                let _ = write!(result, "{v:.6}");
            }
            TypeTag::Bool => {
                let v = take!(1)[0];
                result.push_str(if v != 0 { "true" } else { "false" });
            }
            TypeTag::StringView => {
                let raw = take!(12);
                let ptr = u64::from_le_bytes(raw[..8].try_into().unwrap());
                let len = u32::from_le_bytes(raw[8..].try_into().unwrap());
                result.push_str(&view_to_string(ptr, len));
            }
            TypeTag::StringCopy => {
                let len = u16::from_le_bytes(take!(2).try_into().unwrap()) as usize;
                let bytes = take!(len);
                result.push_str(&String::from_utf8_lossy(bytes));
            }
            TypeTag::Pointer => {
                let v = u64::from_le_bytes(take!(8).try_into().unwrap());
                let _ = write!(result, "{v:#x}");
            }
        }

        *offset = at;
        true
    }

    // =========================================================================
    // Cross-process conversion
    // =========================================================================

    /// Rewrite every borrowed `StringView` record as an inline `StringCopy`
    /// so the snapshot no longer references this address space. Records that
    /// would overflow the buffer are dropped and the argument count adjusted.
    /// Idempotent: a snapshot with no views is unchanged.
    pub fn convert_borrowed_to_inline(&mut self) {
        if self.arg_count == 0 {
            return;
        }

        let mut out = [0u8; SNAPSHOT_CAPACITY];
        let mut out_off = SNAPSHOT_HEADER_SIZE;
        let mut out_count: u16 = 0;

        let end = self.offset as usize;
        let mut off = SNAPSHOT_HEADER_SIZE;
        let mut seen: u16 = 0;

        while off < end && seen < self.arg_count {
            let Some(tag) = TypeTag::from_u8(self.buf[off]) else {
                break;
            };
            off += 1;
            seen += 1;

            if tag == TypeTag::StringView {
                if off + 12 > end {
                    break;
                }
                let (ptr, len) = self.decode_view(off);
                off += 12;

                let copy_len = (len as usize).min(u16::MAX as usize);
                let needed = 1 + 2 + copy_len;
                if out_off + needed <= SNAPSHOT_CAPACITY {
                    out[out_off] = TypeTag::StringCopy as u8;
                    out_off += 1;
                    out[out_off..out_off + 2].copy_from_slice(&(copy_len as u16).to_le_bytes());
                    out_off += 2;
                    if ptr != 0 && copy_len > 0 {
                        // SAFETY: views are only captured from live string data
                        // and conversion runs before that data can be released
                        // (producer side of the mproc pipeline).
                        let bytes = unsafe {
                            std::slice::from_raw_parts(ptr as *const u8, copy_len)
                        };
                        out[out_off..out_off + copy_len].copy_from_slice(bytes);
                        out_off += copy_len;
                    }
                    out_count += 1;
                }
            } else {
                let Some(size) = self.record_payload_size(tag, off) else {
                    break;
                };
                if off + size > end {
                    break;
                }
                if out_off + 1 + size <= SNAPSHOT_CAPACITY {
                    out[out_off] = tag as u8;
                    out_off += 1;
                    out[out_off..out_off + size].copy_from_slice(&self.buf[off..off + size]);
                    out_off += size;
                    out_count += 1;
                }
                off += size;
            }
        }

        out[..SNAPSHOT_HEADER_SIZE].copy_from_slice(&out_count.to_le_bytes());
        self.buf = out;
        self.offset = out_off as u16;
        self.arg_count = out_count;
    }

    /// Payload size of the record whose tag sits just before `payload_at`.
    fn record_payload_size(&self, tag: TypeTag, payload_at: usize) -> Option<usize> {
        match tag {
            TypeTag::Int32 | TypeTag::UInt32 | TypeTag::Float => Some(4),
            TypeTag::Int64 | TypeTag::UInt64 | TypeTag::Double | TypeTag::Pointer => Some(8),
            TypeTag::Bool => Some(1),
            TypeTag::StringView => Some(12),
            TypeTag::StringCopy => {
                if payload_at + 2 > SNAPSHOT_CAPACITY {
                    return None;
                }
                let len =
                    u16::from_le_bytes([self.buf[payload_at], self.buf[payload_at + 1]]) as usize;
                Some(2 + len)
            }
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Copy the fixed-size buffer into `out`. `out` must hold at least
    /// [`Snapshot::capacity`] bytes; returns the number written.
    pub fn serialize_to(&self, out: &mut [u8]) -> usize {
        out[..SNAPSHOT_CAPACITY].copy_from_slice(&self.buf);
        SNAPSHOT_CAPACITY
    }

    /// Reconstruct a snapshot from wire bytes.
    ///
    /// The argument-count header is cross-checked against the records actually
    /// decodable within the buffer; a short or corrupt buffer yields the
    /// longest intact prefix.
    pub fn deserialize_from(data: &[u8]) -> Snapshot {
        let mut snapshot = Snapshot::new();
        let copy = data.len().min(SNAPSHOT_CAPACITY);
        snapshot.buf[..copy].copy_from_slice(&data[..copy]);

        let declared = if copy >= SNAPSHOT_HEADER_SIZE {
            u16::from_le_bytes([snapshot.buf[0], snapshot.buf[1]])
        } else {
            0
        };

        // Walk the records to find the intact prefix.
        let mut off = SNAPSHOT_HEADER_SIZE;
        let mut intact: u16 = 0;
        while intact < declared && off < copy {
            let Some(tag) = TypeTag::from_u8(snapshot.buf[off]) else {
                break;
            };
            let Some(size) = snapshot.record_payload_size(tag, off + 1) else {
                break;
            };
            if off + 1 + size > copy {
                break;
            }
            off += 1 + size;
            intact += 1;
        }

        snapshot.arg_count = intact;
        snapshot.offset = off as u16;
        snapshot.buf[..SNAPSHOT_HEADER_SIZE].copy_from_slice(&intact.to_le_bytes());
        snapshot
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.arg_count == other.arg_count
            && self.offset == other.offset
            && self.buf[..self.offset as usize] == other.buf[..other.offset as usize]
    }
}

impl Eq for Snapshot {}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("arg_count", &self.arg_count)
            .field("offset", &self.offset)
            .finish()
    }
}

fn view_to_string(ptr: u64, len: u32) -> String {
    if ptr == 0 || len == 0 {
        return String::new();
    }
    // SAFETY: the view contract guarantees the referent outlives the snapshot
    // until it is consumed or converted; captures come from `&'static str`.
    let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len as usize) };
    String::from_utf8_lossy(bytes).into_owned()
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b < 0xE0 => 2,
        b if b < 0xF0 => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_increments_count() {
        let mut snap = Snapshot::new();
        assert!(snap.is_empty());

        assert!(snap.capture_i32(42));
        assert_eq!(snap.arg_count(), 1);

        assert!(snap.capture_bool(true));
        assert_eq!(snap.arg_count(), 2);

        // Header mirrors the count.
        assert_eq!(u16::from_le_bytes([snap.as_bytes()[0], snap.as_bytes()[1]]), 2);
    }

    #[test]
    fn test_failed_capture_leaves_snapshot_unchanged() {
        let mut snap = Snapshot::new();
        let filler = "x".repeat(Snapshot::capacity());
        assert!(!snap.capture_str(&filler));
        assert_eq!(snap.arg_count(), 0);
        assert_eq!(snap.offset(), SNAPSHOT_HEADER_SIZE);

        // Fill almost completely, then verify a too-large capture is a no-op.
        assert!(snap.capture_str(&"y".repeat(200)));
        let offset_before = snap.offset();
        let count_before = snap.arg_count();
        assert!(!snap.capture_str(&"z".repeat(100)));
        assert_eq!(snap.offset(), offset_before);
        assert_eq!(snap.arg_count(), count_before);
    }

    #[test]
    fn test_format_with_template() {
        let mut snap = Snapshot::new();
        snap.capture_i32(7);
        snap.capture_str("worker");
        snap.capture_bool(false);
        assert_eq!(snap.format_with("id={} name={} busy={}"), "id=7 name=worker busy=false");
    }

    #[test]
    fn test_format_all_uses_first_string_as_template() {
        let mut snap = Snapshot::new();
        snap.capture_view("v={} name={} pi={}");
        snap.capture_i32(42);
        snap.capture_str("plume");
        snap.capture_f64(3.14);
        assert_eq!(snap.format_all(), "v=42 name=plume pi=3.140000");
    }

    #[test]
    fn test_format_all_fallback_space_separated() {
        let mut snap = Snapshot::new();
        snap.capture_i32(1);
        snap.capture_u64(2);
        snap.capture_bool(true);
        assert_eq!(snap.format_all(), "1 2 true");
    }

    #[test]
    fn test_format_pointer_hex() {
        let mut snap = Snapshot::new();
        snap.capture_ptr(0xdead);
        assert_eq!(snap.format_with("{}"), "0xdead");
    }

    #[test]
    fn test_surplus_placeholders_render_empty() {
        let mut snap = Snapshot::new();
        snap.capture_i32(1);
        assert_eq!(snap.format_with("{} and {}"), "1 and ");
    }

    #[test]
    fn test_convert_borrowed_to_inline() {
        let mut snap = Snapshot::new();
        snap.capture_view("static text");
        snap.capture_i32(5);
        snap.convert_borrowed_to_inline();

        // View became an inline copy; primitives untouched.
        assert_eq!(snap.as_bytes()[SNAPSHOT_HEADER_SIZE], TypeTag::StringCopy as u8);
        assert_eq!(snap.arg_count(), 2);
        assert_eq!(snap.format_with("{} {}"), "static text 5");
    }

    #[test]
    fn test_convert_is_idempotent() {
        let mut snap = Snapshot::new();
        snap.capture_view("hello");
        snap.capture_u64(9);
        snap.convert_borrowed_to_inline();
        let once = snap;
        snap.convert_borrowed_to_inline();
        assert_eq!(snap, once);
    }

    #[test]
    fn test_convert_survives_freed_source() {
        let mut snap = Snapshot::new();
        {
            let heap_string = String::from("transient payload");
            // Capture the heap string's bytes as a raw view, then convert
            // before it drops.
            assert!(snap.capture_view_raw(heap_string.as_ptr(), heap_string.len()));
            snap.convert_borrowed_to_inline();
        }
        assert_eq!(snap.format_all(), "transient payload");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut snap = Snapshot::new();
        snap.capture_i32(42);
        snap.capture_str("plume");
        snap.capture_f64(3.14);

        let mut wire = [0u8; SNAPSHOT_CAPACITY];
        assert_eq!(snap.serialize_to(&mut wire), SNAPSHOT_CAPACITY);

        let restored = Snapshot::deserialize_from(&wire);
        assert_eq!(restored, snap);
        assert_eq!(restored.format_with("v={} name={} pi={}"), "v=42 name=plume pi=3.140000");
    }

    #[test]
    fn test_deserialize_truncated_stops_at_intact_record() {
        let mut snap = Snapshot::new();
        snap.capture_i32(1);
        snap.capture_i64(2);
        let mut wire = [0u8; SNAPSHOT_CAPACITY];
        snap.serialize_to(&mut wire);

        // Cut the second record in half.
        let cut = SNAPSHOT_HEADER_SIZE + 5 + 4;
        let restored = Snapshot::deserialize_from(&wire[..cut]);
        assert_eq!(restored.arg_count(), 1);
        assert_eq!(restored.format_with("{}"), "1");
    }

    #[test]
    fn test_capture_many_stops_on_overflow() {
        let mut snap = Snapshot::new();
        let big = "b".repeat(300);
        let args = [Arg::I32(1), Arg::Str(&big), Arg::I32(2)];
        assert!(!snap.capture_many(&args));
        // First argument landed, oversized one was refused.
        assert_eq!(snap.arg_count(), 1);
    }
}
