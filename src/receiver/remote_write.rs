//! Remote-Write Decoding
//!
//! Prometheus remote-write bodies are snappy block-compressed protobuf
//! `WriteRequest` messages. Only the fields needed here are declared.

use prost::Message;

use crate::error::Result;
use crate::tracker::LabelSet;

/// Top-level remote-write message.
#[derive(Clone, PartialEq, Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// One series with its samples.
#[derive(Clone, PartialEq, Message)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    /// Milliseconds since the Unix epoch
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

impl TimeSeries {
    /// Label set identifying this series.
    pub fn label_set(&self) -> LabelSet {
        self.labels
            .iter()
            .map(|l| (l.name.as_str(), l.value.as_str()))
            .collect()
    }

    /// Newest sample timestamp, if any samples are present.
    pub fn max_timestamp(&self) -> Option<i64> {
        self.samples.iter().map(|s| s.timestamp).max()
    }
}

/// Decompress and decode a remote-write body.
pub fn decode_write_request(body: &[u8]) -> Result<Vec<TimeSeries>> {
    let raw = snap::raw::Decoder::new().decompress_vec(body)?;
    let request = WriteRequest::decode(raw.as_slice())?;
    Ok(request.timeseries)
}

/// Compress and encode series as a remote-write body.
pub fn encode_write_request(timeseries: Vec<TimeSeries>) -> Result<Vec<u8>> {
    let raw = WriteRequest { timeseries }.encode_to_vec();
    Ok(snap::raw::Encoder::new().compress_vec(&raw)?)
}

/// Label sets of `timeseries`, in order.
pub fn to_label_sets(timeseries: &[TimeSeries]) -> Vec<LabelSet> {
    timeseries.iter().map(TimeSeries::label_set).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;

    fn series(labels: &[(&str, &str)], timestamps: &[i64]) -> TimeSeries {
        TimeSeries {
            labels: labels
                .iter()
                .map(|(n, v)| Label {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            samples: timestamps
                .iter()
                .map(|ts| Sample {
                    value: 1.0,
                    timestamp: *ts,
                })
                .collect(),
        }
    }

    #[test]
    fn test_decode_body() {
        let body = encode_write_request(vec![
            series(&[("__name__", "up"), ("job", "node")], &[1000, 2000]),
            series(&[("__name__", "up"), ("job", "api")], &[]),
        ])
        .unwrap();

        let decoded = decode_write_request(&body).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].max_timestamp(), Some(2000));
        assert_eq!(decoded[1].max_timestamp(), None);

        let sets = to_label_sets(&decoded);
        assert_eq!(sets[0].get("job"), Some("node"));
        assert_eq!(sets[1].get("job"), Some("api"));
    }

    #[test]
    fn test_decode_rejects_bad_snappy() {
        let err = decode_write_request(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert_matches!(err, Error::Snappy(_));
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_decode_rejects_bad_protobuf() {
        let body = snap::raw::Encoder::new()
            .compress_vec(&[0x0a, 0xff, 0xff])
            .unwrap();
        let err = decode_write_request(&body).unwrap_err();
        assert_matches!(err, Error::Protobuf(_));
    }

    #[test]
    fn test_empty_body_decodes_to_nothing() {
        let body = encode_write_request(vec![]).unwrap();
        assert!(decode_write_request(&body).unwrap().is_empty());
    }
}
