//! Record encoding for sequence model input.
//!
//! Projects decoded `(timestamp, value)` samples onto the fixed two-field
//! schema the generated model parameters are written against: `c0` is the
//! timestamp and `c1` the scalar value.

use crate::types::record::InputRecord;
use chrono::{DateTime, Utc};

/// Value type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    DateTime,
    Float,
}

/// Special role a schema field plays for the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpecial {
    None,
    /// The record's primary timestamp
    Timestamp,
}

/// Static description of one input field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: &'static str,
    pub field_type: FieldType,
    pub special: FieldSpecial,
}

/// Input column meta info matching the scalar-with-time-of-day parameters.
pub const INPUT_RECORD_SCHEMA: [FieldMeta; 2] = [
    FieldMeta {
        name: "c0",
        field_type: FieldType::DateTime,
        special: FieldSpecial::Timestamp,
    },
    FieldMeta {
        name: "c1",
        field_type: FieldType::Float,
        special: FieldSpecial::None,
    },
];

/// A typed field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    DateTime(DateTime<Utc>),
    Float(f64),
}

/// One field of an encoded record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedField {
    pub meta: FieldMeta,
    pub value: FieldValue,
}

/// An input record in the shape the sequence model consumes
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRecord {
    fields: Vec<EncodedField>,
}

impl EncodedRecord {
    pub fn fields(&self) -> &[EncodedField] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&EncodedField> {
        self.fields.iter().find(|f| f.meta.name == name)
    }

    /// Float value of the named field, if present and numeric.
    pub fn float(&self, name: &str) -> Option<f64> {
        match self.field(name)?.value {
            FieldValue::Float(v) => Some(v),
            FieldValue::DateTime(_) => None,
        }
    }

    /// Value of the field carrying the timestamp role.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.fields
            .iter()
            .find(|f| f.meta.special == FieldSpecial::Timestamp)
            .and_then(|f| match f.value {
                FieldValue::DateTime(ts) => Some(ts),
                FieldValue::Float(_) => None,
            })
    }
}

/// Encoder mapping input records onto [`INPUT_RECORD_SCHEMA`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordEncoder;

impl RecordEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a record. Field order follows the schema.
    pub fn encode(&self, record: &InputRecord) -> EncodedRecord {
        let fields = INPUT_RECORD_SCHEMA
            .iter()
            .map(|meta| {
                let value = match meta.field_type {
                    FieldType::DateTime => FieldValue::DateTime(record.timestamp),
                    FieldType::Float => FieldValue::Float(record.value),
                };
                EncodedField { meta: *meta, value }
            })
            .collect();

        EncodedRecord { fields }
    }

    /// Field names in schema order.
    pub fn field_names(&self) -> Vec<&'static str> {
        INPUT_RECORD_SCHEMA.iter().map(|f| f.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InputRecord {
        InputRecord::from_epoch_seconds(1_438_649_711.0, 835.5).unwrap()
    }

    #[test]
    fn test_encode_follows_schema() {
        let encoded = RecordEncoder::new().encode(&sample());

        assert_eq!(encoded.fields().len(), 2);
        assert_eq!(encoded.fields()[0].meta.name, "c0");
        assert_eq!(encoded.fields()[1].meta.name, "c1");
        assert_eq!(encoded.float("c1"), Some(835.5));
        assert_eq!(encoded.timestamp(), Some(sample().timestamp));
    }

    #[test]
    fn test_timestamp_field_is_not_a_float() {
        let encoded = RecordEncoder::new().encode(&sample());
        assert_eq!(encoded.float("c0"), None);
        assert!(encoded.field("c2").is_none());
    }

    #[test]
    fn test_field_names() {
        assert_eq!(RecordEncoder::new().field_names(), vec!["c0", "c1"]);
    }
}
