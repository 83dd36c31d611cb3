//! Fixed-width n-gram record buckets
//!
//! A bucket is a byte slice of equal-sized records. Each record holds
//! `fields_per_record` ids of 2 or 4 bytes in the configured byte order;
//! field 0 is the follower word id and records are sorted ascending by it.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdWidth {
    #[default]
    Two,
    Four,
}

impl IdWidth {
    pub fn bytes(self) -> usize {
        match self {
            IdWidth::Two => 2,
            IdWidth::Four => 4,
        }
    }

    fn max_id(self) -> u32 {
        match self {
            IdWidth::Two => u16::MAX as u32,
            IdWidth::Four => u32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Record layout shared by all buckets of one n-gram order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NGramLayout {
    pub id_width: IdWidth,
    pub endianness: Endianness,
    pub fields_per_record: usize,
}

impl NGramLayout {
    pub fn new(id_width: IdWidth, endianness: Endianness, fields_per_record: usize) -> Self {
        Self {
            id_width,
            endianness,
            fields_per_record,
        }
    }

    pub fn record_size(&self) -> usize {
        self.id_width.bytes() * self.fields_per_record
    }
}

/// One bucket of n-gram records
#[derive(Debug, Clone, PartialEq)]
pub struct NGramBuffer {
    bytes: Vec<u8>,
    layout: NGramLayout,
    len: usize,
}

impl NGramBuffer {
    /// Wrap raw bytes, checking size and sort order
    pub fn new(bytes: Vec<u8>, layout: NGramLayout) -> Result<Self> {
        if layout.fields_per_record == 0 {
            return Err(SearchError::ngram("Records need at least the word id field"));
        }
        let record_size = layout.record_size();
        if bytes.len() % record_size != 0 {
            return Err(SearchError::ngram(format!(
                "{} bytes is not a whole number of {}-byte records",
                bytes.len(),
                record_size
            )));
        }

        let buffer = Self {
            len: bytes.len() / record_size,
            bytes,
            layout,
        };
        for i in 1..buffer.len {
            let (prev, next) = (buffer.word_id(i - 1), buffer.word_id(i));
            if prev >= next {
                return Err(SearchError::ngram(format!(
                    "Records not sorted by word id: {} at {} follows {}",
                    next, i, prev
                )));
            }
        }
        Ok(buffer)
    }

    /// Encode records given as field lists
    pub fn from_records(records: &[Vec<u32>], layout: NGramLayout) -> Result<Self> {
        let mut bytes = Vec::with_capacity(records.len() * layout.record_size());
        for record in records {
            if record.len() != layout.fields_per_record {
                return Err(SearchError::ngram(format!(
                    "Record has {} fields, layout expects {}",
                    record.len(),
                    layout.fields_per_record
                )));
            }
            for &field in record {
                if field > layout.id_width.max_id() {
                    return Err(SearchError::ngram(format!(
                        "Id {} does not fit in {} bytes",
                        field,
                        layout.id_width.bytes()
                    )));
                }
                match (layout.id_width, layout.endianness) {
                    (IdWidth::Two, Endianness::Little) => bytes.extend_from_slice(&(field as u16).to_le_bytes()),
                    (IdWidth::Two, Endianness::Big) => bytes.extend_from_slice(&(field as u16).to_be_bytes()),
                    (IdWidth::Four, Endianness::Little) => bytes.extend_from_slice(&field.to_le_bytes()),
                    (IdWidth::Four, Endianness::Big) => bytes.extend_from_slice(&field.to_be_bytes()),
                }
            }
        }
        Self::new(bytes, layout)
    }

    pub fn layout(&self) -> NGramLayout {
        self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Field `field` of record `record`; panics when out of range
    pub fn field(&self, record: usize, field: usize) -> u32 {
        assert!(record < self.len, "record {} out of {}", record, self.len);
        assert!(field < self.layout.fields_per_record);

        let width = self.layout.id_width.bytes();
        let at = record * self.layout.record_size() + field * width;
        let raw = &self.bytes[at..at + width];
        match (self.layout.id_width, self.layout.endianness) {
            (IdWidth::Two, Endianness::Little) => u16::from_le_bytes([raw[0], raw[1]]) as u32,
            (IdWidth::Two, Endianness::Big) => u16::from_be_bytes([raw[0], raw[1]]) as u32,
            (IdWidth::Four, Endianness::Little) => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            (IdWidth::Four, Endianness::Big) => u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
        }
    }

    pub fn word_id(&self, record: usize) -> u32 {
        self.field(record, 0)
    }

    pub fn record(&self, index: usize) -> NGramRecord<'_> {
        assert!(index < self.len);
        NGramRecord { buffer: self, index }
    }

    /// Record whose follower word id is `word_id`, if any
    pub fn find(&self, word_id: u32) -> Option<NGramRecord<'_>> {
        let (mut low, mut high) = (0, self.len);
        while low < high {
            let mid = low + (high - low) / 2;
            let found = self.word_id(mid);
            if found == word_id {
                return Some(NGramRecord { buffer: self, index: mid });
            }
            if found < word_id {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        None
    }
}

/// View of one record inside an [`NGramBuffer`]
#[derive(Debug, Clone, Copy)]
pub struct NGramRecord<'a> {
    buffer: &'a NGramBuffer,
    index: usize,
}

impl NGramRecord<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn word_id(&self) -> u32 {
        self.buffer.word_id(self.index)
    }

    pub fn field(&self, field: usize) -> u32 {
        self.buffer.field(self.index, field)
    }

    /// Field 1, the probability id, when the layout has one
    pub fn probability_id(&self) -> Option<u32> {
        (self.buffer.layout.fields_per_record > 1).then(|| self.field(1))
    }
}
