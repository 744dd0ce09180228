#[allow(unused_imports)]
use bytes::{BufMut, BytesMut};
#[cfg(feature = "chrono")]
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Timelike, Utc};
#[cfg(feature = "rust_decimal")]
use rust_decimal::Decimal;
#[cfg(feature = "smol_str")]
use smol_str::SmolStr;
#[cfg(feature = "ulid")]
use ulid::Ulid;
#[cfg(feature = "uuid")]
use uuid::Uuid;

#[allow(unused_imports)]
use crate::core::*;
#[allow(unused_imports)]
use crate::*;
#[allow(unused_imports)]
use tracing::warn;

/// Registers the optional types under their .NET names.
#[allow(unused_variables)]
pub(crate) fn register_builtins(container: &CodecContainer) {
    #[allow(unused_macros)]
    macro_rules! builtin {
        ($ty:ty => $name:literal) => {
            if let Err(err) = container.register::<$ty>($name) {
                warn!("failed to register builtin type {}: {}", $name, err);
            }
        };
    }

    #[cfg(feature = "uuid")]
    builtin!(Uuid => "System.Guid");
    #[cfg(feature = "rust_decimal")]
    builtin!(Decimal => "System.Decimal");
    #[cfg(feature = "chrono")]
    {
        builtin!(DateTime<Utc> => "System.DateTime");
        builtin!(NaiveDate => "System.DateOnly");
        builtin!(NaiveTime => "System.TimeOnly");
        builtin!(Duration => "System.TimeSpan");
    }
}

// --- ticks ---

/// 100-nanosecond intervals per second.
#[cfg(feature = "chrono")]
const TICKS_PER_SECOND: i64 = 10_000_000;
#[cfg(feature = "chrono")]
const NANOS_PER_TICK: i64 = 100;
/// Seconds between 0001-01-01 and 1970-01-01.
#[cfg(feature = "chrono")]
const UNIX_EPOCH_SECONDS: i64 = 62_135_596_800;
/// Ticks of 9999-12-31 23:59:59.9999999, the last representable instant.
#[cfg(feature = "chrono")]
const MAX_DATE_TICKS: i64 = 3_155_378_975_999_999_999;
#[cfg(feature = "chrono")]
const TICKS_PER_DAY: i64 = 86_400 * TICKS_PER_SECOND;

#[cfg(feature = "chrono")]
fn out_of_range(what: &str) -> EncoderError {
    EncoderError::Encode(format!("{} is outside the tick range", what))
}

#[cfg(feature = "chrono")]
fn corrupt_ticks(context: &'static str, ticks: i64) -> EncoderError {
    EncoderError::Corrupt {
        context,
        detail: format!("tick count {} out of range", ticks),
    }
}

// --- DateTime<Utc> ---
/// Ticks since 0001-01-01T00:00:00 UTC, sub-tick precision truncated.
#[cfg(feature = "chrono")]
fn date_time_ticks(value: &DateTime<Utc>) -> Result<i64> {
    value
        .timestamp()
        .checked_add(UNIX_EPOCH_SECONDS)
        .and_then(|seconds| seconds.checked_mul(TICKS_PER_SECOND))
        .and_then(|ticks| ticks.checked_add(i64::from(value.timestamp_subsec_nanos()) / NANOS_PER_TICK))
        .filter(|ticks| (0..=MAX_DATE_TICKS).contains(ticks))
        .ok_or_else(|| out_of_range("DateTime"))
}

#[cfg(feature = "chrono")]
fn date_time_from_ticks(ticks: i64, context: &'static str) -> Result<DateTime<Utc>> {
    if !(0..=MAX_DATE_TICKS).contains(&ticks) {
        return Err(corrupt_ticks(context, ticks));
    }
    let seconds = ticks / TICKS_PER_SECOND - UNIX_EPOCH_SECONDS;
    let nanos = (ticks % TICKS_PER_SECOND * NANOS_PER_TICK) as u32;
    DateTime::from_timestamp(seconds, nanos).ok_or_else(|| corrupt_ticks(context, ticks))
}

#[cfg(feature = "chrono")]
impl Encoder for DateTime<Utc> {
    const FIXED_SIZE: Option<usize> = Some(8);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        8
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_i64_le(date_time_ticks(self)?);
        Ok(())
    }
}

#[cfg(feature = "chrono")]
impl Decoder for DateTime<Utc> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let ticks = reader.read_i64("DateTime")?;
        date_time_from_ticks(ticks, "DateTime")
    }
}

// --- DateTime<Local> ---
/// Same wire form as `DateTime<Utc>`; the offset is not transmitted.
#[cfg(feature = "chrono")]
impl Encoder for DateTime<Local> {
    const FIXED_SIZE: Option<usize> = Some(8);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        8
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_i64_le(date_time_ticks(&self.with_timezone(&Utc))?);
        Ok(())
    }
}

#[cfg(feature = "chrono")]
impl Decoder for DateTime<Local> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let ticks = reader.read_i64("DateTime<Local>")?;
        Ok(date_time_from_ticks(ticks, "DateTime<Local>")?.with_timezone(&Local))
    }
}

// --- NaiveDate ---
/// Day number: days since 0001-01-01.
#[cfg(feature = "chrono")]
impl Encoder for NaiveDate {
    const FIXED_SIZE: Option<usize> = Some(4);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        4
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        use chrono::Datelike;
        let day_number = self.num_days_from_ce() - 1;
        if day_number < 0 {
            return Err(out_of_range("NaiveDate"));
        }
        writer.put_i32_le(day_number);
        Ok(())
    }
}

#[cfg(feature = "chrono")]
impl Decoder for NaiveDate {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let day_number = reader.read_i32("NaiveDate")?;
        day_number
            .checked_add(1)
            .filter(|_| day_number >= 0)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| EncoderError::Corrupt {
                context: "NaiveDate",
                detail: format!("day number {} out of range", day_number),
            })
    }
}

// --- NaiveTime ---
/// Ticks since midnight.
#[cfg(feature = "chrono")]
impl Encoder for NaiveTime {
    const FIXED_SIZE: Option<usize> = Some(8);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        8
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        // A leap second is folded into the last tick of its minute.
        let nanos = i64::from(self.nanosecond().min(999_999_999));
        let ticks = i64::from(self.num_seconds_from_midnight()) * TICKS_PER_SECOND + nanos / NANOS_PER_TICK;
        writer.put_i64_le(ticks);
        Ok(())
    }
}

#[cfg(feature = "chrono")]
impl Decoder for NaiveTime {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let ticks = reader.read_i64("NaiveTime")?;
        if !(0..TICKS_PER_DAY).contains(&ticks) {
            return Err(corrupt_ticks("NaiveTime", ticks));
        }
        let seconds = (ticks / TICKS_PER_SECOND) as u32;
        let nanos = (ticks % TICKS_PER_SECOND * NANOS_PER_TICK) as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos).ok_or_else(|| corrupt_ticks("NaiveTime", ticks))
    }
}

// --- Duration ---
/// Signed tick count.
#[cfg(feature = "chrono")]
impl Encoder for Duration {
    const FIXED_SIZE: Option<usize> = Some(8);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        8
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        let ticks = self
            .num_seconds()
            .checked_mul(TICKS_PER_SECOND)
            .and_then(|ticks| ticks.checked_add(i64::from(self.subsec_nanos()) / NANOS_PER_TICK))
            .ok_or_else(|| out_of_range("Duration"))?;
        writer.put_i64_le(ticks);
        Ok(())
    }
}

#[cfg(feature = "chrono")]
impl Decoder for Duration {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let ticks = reader.read_i64("Duration")?;
        Ok(Duration::seconds(ticks / TICKS_PER_SECOND)
            + Duration::nanoseconds(ticks % TICKS_PER_SECOND * NANOS_PER_TICK))
    }
}

// --- Decimal ---
/// In-memory image of a .NET decimal: flags, high 32 bits, then low 64 bits of the mantissa.
#[cfg(feature = "rust_decimal")]
impl Encoder for Decimal {
    const FIXED_SIZE: Option<usize> = Some(16);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        16
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        // serialize() yields flags, lo, mid, hi.
        let raw = self.serialize();
        writer.put_slice(&raw[0..4]);
        writer.put_slice(&raw[12..16]);
        writer.put_slice(&raw[4..12]);
        Ok(())
    }
}

#[cfg(feature = "rust_decimal")]
impl Decoder for Decimal {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let mut image = [0u8; 16];
        reader.copy_to_slice(&mut image, "Decimal")?;
        let flags = u32::from_le_bytes([image[0], image[1], image[2], image[3]]);
        let scale = (flags >> 16) & 0xFF;
        if scale > 28 || flags & 0x7F00_FFFF != 0 {
            return Err(EncoderError::Corrupt {
                context: "Decimal",
                detail: format!("invalid flags {:#010x}", flags),
            });
        }
        let mut raw = [0u8; 16];
        raw[0..4].copy_from_slice(&image[0..4]);
        raw[4..12].copy_from_slice(&image[8..16]);
        raw[12..16].copy_from_slice(&image[4..8]);
        Ok(Decimal::deserialize(raw))
    }
}

// --- UUID ---
/// Guid byte order: the first three fields little-endian, the rest as is.
#[cfg(feature = "uuid")]
impl Encoder for Uuid {
    const FIXED_SIZE: Option<usize> = Some(16);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        16
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_slice(&self.to_bytes_le());
        Ok(())
    }
}

#[cfg(feature = "uuid")]
impl Decoder for Uuid {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let mut bytes = [0u8; 16];
        reader.copy_to_slice(&mut bytes, "Uuid")?;
        Ok(Uuid::from_bytes_le(bytes))
    }
}

// --- ULID ---
#[cfg(feature = "ulid")]
impl Encoder for Ulid {
    const FIXED_SIZE: Option<usize> = Some(16);
    const KIND: CodecKind = CodecKind::FixedLayout;

    fn calculate_size(&self) -> usize {
        16
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        writer.put_slice(&self.to_bytes());
        Ok(())
    }
}

#[cfg(feature = "ulid")]
impl Decoder for Ulid {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let mut bytes = [0u8; 16];
        reader.copy_to_slice(&mut bytes, "Ulid")?;
        Ok(Ulid::from_bytes(bytes))
    }
}

// --- SmolStr ---
#[cfg(feature = "smol_str")]
impl Encoder for SmolStr {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::String;

    fn calculate_size(&self) -> usize {
        string_size(self)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        encode_str(self, writer)
    }
}

#[cfg(feature = "smol_str")]
impl Decoder for SmolStr {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        decode_string(reader, "SmolStr")?
            .map(SmolStr::from)
            .ok_or_else(|| unexpected_null("SmolStr"))
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;
    #[allow(unused_imports)]
    use bytes::Bytes;

    #[cfg(feature = "chrono")]
    #[test]
    fn test_date_time_ticks() {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let encoded = crate::encode(&epoch).unwrap();
        assert_eq!(
            i64::from_le_bytes(encoded[..].try_into().unwrap()),
            621_355_968_000_000_000
        );
        let mut buf = encoded;
        assert_eq!(crate::decode::<DateTime<Utc>>(&mut buf).unwrap(), epoch);

        let mut negative = Bytes::copy_from_slice(&(-1i64).to_le_bytes());
        assert!(crate::decode::<DateTime<Utc>>(&mut negative).is_err());
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn test_date_and_time_of_day() {
        let date = NaiveDate::from_ymd_opt(1, 1, 2).unwrap();
        assert_eq!(&crate::encode(&date).unwrap()[..], &1i32.to_le_bytes());

        let time = NaiveTime::from_hms_nano_opt(0, 0, 1, 500).unwrap();
        let mut buf = crate::encode(&time).unwrap();
        assert_eq!(&buf[..], &10_000_005i64.to_le_bytes());
        assert_eq!(crate::decode::<NaiveTime>(&mut buf).unwrap(), time);

        let span = Duration::milliseconds(-1500);
        let mut buf = crate::encode(&span).unwrap();
        assert_eq!(&buf[..], &(-15_000_000i64).to_le_bytes());
        assert_eq!(crate::decode::<Duration>(&mut buf).unwrap(), span);
    }

    #[cfg(feature = "uuid")]
    #[test]
    fn test_guid_byte_order() {
        let id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let mut buf = crate::encode(&id).unwrap();
        assert_eq!(
            &buf[..],
            &[0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]
        );
        assert_eq!(crate::decode::<Uuid>(&mut buf).unwrap(), id);
    }

    #[cfg(feature = "rust_decimal")]
    #[test]
    fn test_decimal_image() {
        let value = Decimal::new(-12345, 2);
        let mut buf = crate::encode(&value).unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[0..4], &[0, 0, 2, 0x80]);
        assert_eq!(&buf[8..12], &12345u32.to_le_bytes());
        assert_eq!(crate::decode::<Decimal>(&mut buf).unwrap(), value);
    }

    #[cfg(feature = "smol_str")]
    #[test]
    fn test_smol_str_matches_string() {
        let value = SmolStr::new("hello");
        assert_eq!(crate::encode(&value).unwrap(), crate::encode("hello").unwrap());
    }
}
