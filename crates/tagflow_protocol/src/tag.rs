//! Raw tag-report entries and the normalized [`TagEvent`].

use thiserror::Error;

/// One tag observation as delivered by the reader-protocol client.
///
/// Every field is optional because the reader only includes what the tag-content
/// selector enabled. Field names follow the LLRP TagReportData parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTagEntry {
    /// `EPC` / `EPC-96`, raw bytes of the identifier as reported
    pub epc: Option<Vec<u8>>,
    /// `AntennaID`
    pub antenna_id: Option<u16>,
    /// `ChannelIndex`
    pub channel_index: Option<u16>,
    /// `PeakRSSI` in dBm
    pub peak_rssi: Option<i8>,
    /// `FirstSeenTimestampUTC`, microseconds since epoch
    pub first_seen_utc: Option<u64>,
    /// `LastSeenTimestampUTC`, microseconds since epoch
    pub last_seen_utc: Option<u64>,
    /// `TagSeenCount`
    pub seen_count: Option<u32>,
    /// `AccessSpecID`
    pub access_spec_id: Option<u32>,
}

impl RawTagEntry {
    pub fn new(epc: impl Into<Vec<u8>>) -> Self {
        Self {
            epc: Some(epc.into()),
            ..Self::default()
        }
    }

    pub fn with_seen_count(mut self, count: u32) -> Self {
        self.seen_count = Some(count);
        self
    }

    pub fn with_antenna(mut self, antenna: u16) -> Self {
        self.antenna_id = Some(antenna);
        self
    }

    pub fn with_channel(mut self, channel: u16) -> Self {
        self.channel_index = Some(channel);
        self
    }

    pub fn with_peak_rssi(mut self, rssi: i8) -> Self {
        self.peak_rssi = Some(rssi);
        self
    }

    pub fn with_first_seen(mut self, micros: u64) -> Self {
        self.first_seen_utc = Some(micros);
        self
    }

    pub fn with_last_seen(mut self, micros: u64) -> Self {
        self.last_seen_utc = Some(micros);
        self
    }
}

/// Why a single raw entry could not become a [`TagEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("tag entry has no EPC field")]
    MissingEpc,

    #[error("tag entry has an empty EPC")]
    EmptyEpc,

    #[error("EPC contains a non-ASCII byte 0x{byte:02x} at offset {offset}")]
    NonAsciiEpc { offset: usize, byte: u8 },

    #[error("tag entry for EPC {epc} has no seen count")]
    MissingSeenCount { epc: String },

    #[error("tag entry for EPC {epc} reports a seen count of zero")]
    ZeroSeenCount { epc: String },

    #[error("timestamp {micros}us does not fit the event clock")]
    TimestampOutOfRange { micros: u64 },
}

/// Which clock produced [`TagEvent::last_seen_micros`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampSource {
    Reader,
    Host,
}

/// Decode-time knobs.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Use `LastSeenTimestampUTC` when present; otherwise always stamp with the host clock.
    pub prefer_reader_clock: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            prefer_reader_clock: true,
        }
    }
}

/// Normalized tag observation. Immutable once constructed.
///
/// `epc` is the natural key: two events with equal EPC are the same physical tag,
/// whatever their other fields say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEvent {
    epc: String,
    antenna: Option<u16>,
    channel: Option<u16>,
    peak_rssi: Option<i8>,
    seen_count: u32,
    first_seen_micros: Option<i64>,
    last_seen_micros: i64,
    timestamp_source: TimestampSource,
}

impl TagEvent {
    /// Build an event directly from already-validated parts (reader clock).
    pub fn new(
        epc: impl Into<String>,
        seen_count: u32,
        last_seen_micros: i64,
    ) -> Result<Self, DecodeError> {
        let epc = epc.into();
        validate_epc(epc.as_bytes())?;
        if seen_count == 0 {
            return Err(DecodeError::ZeroSeenCount { epc });
        }
        Ok(Self {
            epc,
            antenna: None,
            channel: None,
            peak_rssi: None,
            seen_count,
            first_seen_micros: None,
            last_seen_micros,
            timestamp_source: TimestampSource::Reader,
        })
    }

    pub fn with_antenna(mut self, antenna: u16) -> Self {
        self.antenna = Some(antenna);
        self
    }

    pub fn with_channel(mut self, channel: u16) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Decode one raw report entry.
    pub fn from_raw(raw: &RawTagEntry, options: &DecodeOptions) -> Result<Self, DecodeError> {
        let bytes = raw.epc.as_deref().ok_or(DecodeError::MissingEpc)?;
        validate_epc(bytes)?;
        // validate_epc guarantees ASCII, which is always valid UTF-8
        let epc = String::from_utf8_lossy(bytes).into_owned();

        let seen_count = match raw.seen_count {
            None => return Err(DecodeError::MissingSeenCount { epc }),
            Some(0) => return Err(DecodeError::ZeroSeenCount { epc }),
            Some(count) => count,
        };

        let (last_seen_micros, timestamp_source) =
            match raw.last_seen_utc.filter(|_| options.prefer_reader_clock) {
                Some(micros) => (to_event_clock(micros)?, TimestampSource::Reader),
                None => (host_now_micros(), TimestampSource::Host),
            };
        let first_seen_micros = raw.first_seen_utc.map(to_event_clock).transpose()?;

        Ok(Self {
            epc,
            antenna: raw.antenna_id,
            channel: raw.channel_index,
            peak_rssi: raw.peak_rssi,
            seen_count,
            first_seen_micros,
            last_seen_micros,
            timestamp_source,
        })
    }

    pub fn epc(&self) -> &str {
        &self.epc
    }

    pub fn antenna(&self) -> Option<u16> {
        self.antenna
    }

    pub fn channel(&self) -> Option<u16> {
        self.channel
    }

    pub fn peak_rssi(&self) -> Option<i8> {
        self.peak_rssi
    }

    pub fn seen_count(&self) -> u32 {
        self.seen_count
    }

    pub fn first_seen_micros(&self) -> Option<i64> {
        self.first_seen_micros
    }

    pub fn last_seen_micros(&self) -> i64 {
        self.last_seen_micros
    }

    pub fn timestamp_source(&self) -> TimestampSource {
        self.timestamp_source
    }

    /// `last_seen` rendered as RFC3339 with microsecond precision (UTC).
    pub fn last_seen_rfc3339(&self) -> String {
        match chrono::DateTime::from_timestamp_micros(self.last_seen_micros) {
            Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            None => self.last_seen_micros.to_string(),
        }
    }

    /// Whether two events describe the same physical tag.
    pub fn same_tag(&self, other: &TagEvent) -> bool {
        self.epc == other.epc
    }
}

/// Result of decoding one tag report.
#[derive(Debug, Default)]
pub struct DecodedReport {
    /// Well-formed entries, in report order
    pub events: Vec<TagEvent>,
    /// Index within the report and reason for every dropped entry
    pub rejected: Vec<(usize, DecodeError)>,
}

/// Decode a whole tag report, dropping malformed entries individually.
pub fn decode_report(entries: &[RawTagEntry], options: &DecodeOptions) -> DecodedReport {
    let mut report = DecodedReport {
        events: Vec::with_capacity(entries.len()),
        rejected: Vec::new(),
    };
    for (index, raw) in entries.iter().enumerate() {
        match TagEvent::from_raw(raw, options) {
            Ok(event) => report.events.push(event),
            Err(err) => report.rejected.push((index, err)),
        }
    }
    report
}

fn validate_epc(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyEpc);
    }
    if let Some(offset) = bytes.iter().position(|b| !b.is_ascii()) {
        return Err(DecodeError::NonAsciiEpc {
            offset,
            byte: bytes[offset],
        });
    }
    Ok(())
}

fn to_event_clock(micros: u64) -> Result<i64, DecodeError> {
    i64::try_from(micros).map_err(|_| DecodeError::TimestampOutOfRange { micros })
}

fn host_now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> DecodeOptions {
        DecodeOptions::default()
    }

    #[test]
    fn test_decode_full_entry() {
        let raw = RawTagEntry::new("E2003412")
            .with_seen_count(3)
            .with_antenna(1)
            .with_channel(7)
            .with_peak_rssi(-52)
            .with_first_seen(1_700_000_000_000_000)
            .with_last_seen(1_700_000_000_500_000);

        let event = TagEvent::from_raw(&raw, &opts()).unwrap();
        assert_eq!(event.epc(), "E2003412");
        assert_eq!(event.seen_count(), 3);
        assert_eq!(event.antenna(), Some(1));
        assert_eq!(event.channel(), Some(7));
        assert_eq!(event.peak_rssi(), Some(-52));
        assert_eq!(event.first_seen_micros(), Some(1_700_000_000_000_000));
        assert_eq!(event.last_seen_micros(), 1_700_000_000_500_000);
        assert_eq!(event.timestamp_source(), TimestampSource::Reader);
    }

    #[test]
    fn test_missing_reader_timestamp_falls_back_to_host_clock() {
        let before = chrono::Utc::now().timestamp_micros();
        let event = TagEvent::from_raw(&RawTagEntry::new("E1").with_seen_count(1), &opts()).unwrap();
        assert_eq!(event.timestamp_source(), TimestampSource::Host);
        assert!(event.last_seen_micros() >= before);
    }

    #[test]
    fn test_host_clock_forced() {
        let raw = RawTagEntry::new("E1").with_seen_count(1).with_last_seen(42);
        let options = DecodeOptions {
            prefer_reader_clock: false,
        };
        let event = TagEvent::from_raw(&raw, &options).unwrap();
        assert_eq!(event.timestamp_source(), TimestampSource::Host);
        assert_ne!(event.last_seen_micros(), 42);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            TagEvent::from_raw(&RawTagEntry::default(), &opts()),
            Err(DecodeError::MissingEpc)
        );
        assert_eq!(
            TagEvent::from_raw(&RawTagEntry::new(Vec::new()).with_seen_count(1), &opts()),
            Err(DecodeError::EmptyEpc)
        );
        assert_eq!(
            TagEvent::from_raw(&RawTagEntry::new(vec![b'E', 0xC3]).with_seen_count(1), &opts()),
            Err(DecodeError::NonAsciiEpc {
                offset: 1,
                byte: 0xC3
            })
        );
        assert_eq!(
            TagEvent::from_raw(&RawTagEntry::new("E1"), &opts()),
            Err(DecodeError::MissingSeenCount { epc: "E1".into() })
        );
        assert_eq!(
            TagEvent::from_raw(&RawTagEntry::new("E1").with_seen_count(0), &opts()),
            Err(DecodeError::ZeroSeenCount { epc: "E1".into() })
        );
        assert!(matches!(
            TagEvent::from_raw(
                &RawTagEntry::new("E1").with_seen_count(1).with_last_seen(u64::MAX),
                &opts()
            ),
            Err(DecodeError::TimestampOutOfRange { .. })
        ));
    }

    #[test]
    fn test_decode_report_keeps_good_siblings_in_order() {
        let entries = vec![
            RawTagEntry::new("A").with_seen_count(1),
            RawTagEntry::new("B"),
            RawTagEntry::default(),
            RawTagEntry::new("C").with_seen_count(2),
        ];
        let report = decode_report(&entries, &opts());
        let epcs: Vec<&str> = report.events.iter().map(|e| e.epc()).collect();
        assert_eq!(epcs, vec!["A", "C"]);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.rejected[0].0, 1);
        assert_eq!(report.rejected[1], (2, DecodeError::MissingEpc));
    }

    #[test]
    fn test_same_tag_ignores_other_fields() {
        let a = TagEvent::new("E1", 1, 10).unwrap().with_antenna(1);
        let b = TagEvent::new("E1", 5, 99).unwrap().with_antenna(2);
        assert!(a.same_tag(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_last_seen_rfc3339() {
        let event = TagEvent::new("E1", 1, 1_700_000_000_123_456).unwrap();
        assert_eq!(event.last_seen_rfc3339(), "2023-11-14T22:13:20.123456Z");
    }
}
