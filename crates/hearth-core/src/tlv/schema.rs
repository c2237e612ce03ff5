//! Declarative structure schemas over the TLV codec.
//!
//! A [`StructSchema`] is built once (usually inside a `LazyLock` static) and
//! drives both directions: [`StructSchema::encode`] turns a [`Record`] into
//! bytes and [`StructSchema::decode`] turns bytes back into a `Record`.
//! Typed messages implement [`TlvMessage`] to convert to and from records.
//!
//! ```ignore
//! static POINT: LazyLock<StructSchema> = LazyLock::new(|| {
//!     StructSchema::builder("Point")
//!         .field("x", 1, FieldType::Signed)
//!         .optional("label", 2, FieldType::Utf8)
//!         .build()
//! });
//! ```

use super::element::{Element, Tag, Value, decode, encode};
use crate::error::TlvError;

/// Declared type of a structure field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// Unsigned integer of any width
    Unsigned,
    /// Signed integer of any width
    Signed,
    /// Boolean
    Bool,
    /// UTF-8 string
    Utf8,
    /// Octet string
    Bytes,
    /// Nested structure
    Struct(&'static StructSchema),
    /// Array of anonymous elements of one type
    Array(&'static FieldType),
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name used in records
    pub name: &'static str,
    /// Context tag id
    pub tag: u8,
    /// Declared type
    pub field_type: FieldType,
    /// Whether the field may be absent
    pub optional: bool,
}

/// Immutable structure description.
#[derive(Debug)]
pub struct StructSchema {
    name: &'static str,
    fields: Vec<FieldSpec>,
}

/// Builder for [`StructSchema`].
#[derive(Debug)]
pub struct StructSchemaBuilder {
    name: &'static str,
    fields: Vec<FieldSpec>,
}

impl StructSchemaBuilder {
    /// Add a required field.
    #[must_use]
    pub fn field(mut self, name: &'static str, tag: u8, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name,
            tag,
            field_type,
            optional: false,
        });
        self
    }

    /// Add an optional field.
    #[must_use]
    pub fn optional(mut self, name: &'static str, tag: u8, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name,
            tag,
            field_type,
            optional: true,
        });
        self
    }

    /// Finish the schema.
    #[must_use]
    pub fn build(self) -> StructSchema {
        StructSchema {
            name: self.name,
            fields: self.fields,
        }
    }
}

/// Dynamically typed field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Unsigned integer
    Unsigned(u64),
    /// Signed integer
    Signed(i64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    Utf8(String),
    /// Octet string
    Bytes(Vec<u8>),
    /// Nested structure
    Struct(Record),
    /// Array
    Array(Vec<FieldValue>),
}

/// Field values of one structure, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(&'static str, FieldValue)>,
}

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &'static str, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style insert of an optional value.
    #[must_use]
    pub fn with_opt(mut self, name: &'static str, value: Option<FieldValue>) -> Self {
        if let Some(value) = value {
            self.insert(name, value);
        }
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, name: &'static str, value: FieldValue) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Number of fields present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    /// Required unsigned field converted to `T`.
    ///
    /// # Errors
    ///
    /// `MissingField`, `FieldTypeMismatch`, or `OutOfRange` if it does not fit `T`.
    pub fn unsigned<T: TryFrom<u64>>(&self, name: &'static str) -> Result<T, TlvError> {
        self.opt_unsigned(name)?.ok_or(missing(name))
    }

    /// Optional unsigned field converted to `T`.
    ///
    /// # Errors
    ///
    /// `FieldTypeMismatch`, or `OutOfRange` if it does not fit `T`.
    pub fn opt_unsigned<T: TryFrom<u64>>(&self, name: &'static str) -> Result<Option<T>, TlvError> {
        match self.get(name) {
            None => Ok(None),
            Some(FieldValue::Unsigned(v)) => {
                T::try_from(*v).map(Some).map_err(|_| TlvError::OutOfRange(name))
            }
            Some(_) => Err(mismatch(name)),
        }
    }

    /// Required boolean field.
    ///
    /// # Errors
    ///
    /// `MissingField` or `FieldTypeMismatch`.
    pub fn boolean(&self, name: &'static str) -> Result<bool, TlvError> {
        match self.get(name) {
            Some(FieldValue::Bool(b)) => Ok(*b),
            Some(_) => Err(mismatch(name)),
            None => Err(missing(name)),
        }
    }

    /// Required octet string field.
    ///
    /// # Errors
    ///
    /// `MissingField` or `FieldTypeMismatch`.
    pub fn bytes(&self, name: &'static str) -> Result<&[u8], TlvError> {
        self.opt_bytes(name)?.ok_or(missing(name))
    }

    /// Optional octet string field.
    ///
    /// # Errors
    ///
    /// `FieldTypeMismatch`.
    pub fn opt_bytes(&self, name: &'static str) -> Result<Option<&[u8]>, TlvError> {
        match self.get(name) {
            None => Ok(None),
            Some(FieldValue::Bytes(b)) => Ok(Some(b)),
            Some(_) => Err(mismatch(name)),
        }
    }

    /// Required fixed-size octet string field.
    ///
    /// # Errors
    ///
    /// `MissingField`, `FieldTypeMismatch`, or `OutOfRange` on a length mismatch.
    pub fn byte_array<const N: usize>(&self, name: &'static str) -> Result<[u8; N], TlvError> {
        self.bytes(name)?
            .try_into()
            .map_err(|_| TlvError::OutOfRange(name))
    }

    /// Optional nested structure field.
    ///
    /// # Errors
    ///
    /// `FieldTypeMismatch`.
    pub fn opt_record(&self, name: &'static str) -> Result<Option<&Record>, TlvError> {
        match self.get(name) {
            None => Ok(None),
            Some(FieldValue::Struct(r)) => Ok(Some(r)),
            Some(_) => Err(mismatch(name)),
        }
    }
}

fn missing(field: &'static str) -> TlvError {
    TlvError::MissingField {
        schema: "record",
        field,
    }
}

fn mismatch(field: &'static str) -> TlvError {
    TlvError::FieldTypeMismatch {
        schema: "record",
        field,
    }
}

impl StructSchema {
    /// Start building a schema.
    #[must_use]
    pub fn builder(name: &'static str) -> StructSchemaBuilder {
        StructSchemaBuilder {
            name,
            fields: Vec::new(),
        }
    }

    /// Schema name, used in error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared fields in order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Encode a record as an anonymous top-level structure.
    ///
    /// # Errors
    ///
    /// Returns `MissingField`, `UnknownField` or `FieldTypeMismatch` if the
    /// record does not conform to the schema.
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>, TlvError> {
        Ok(encode(&self.to_element(Tag::Anonymous, record)?))
    }

    /// Decode bytes holding one structure into a record.
    ///
    /// # Errors
    ///
    /// Returns any TLV decoding error, or a schema error if the structure
    /// does not conform.
    pub fn decode(&self, data: &[u8]) -> Result<Record, TlvError> {
        self.from_element(&decode(data)?)
    }

    /// Convert a record into a structure element with the given tag.
    ///
    /// # Errors
    ///
    /// See [`StructSchema::encode`].
    pub fn to_element(&self, tag: Tag, record: &Record) -> Result<Element, TlvError> {
        if let Some((unknown, _)) = record
            .iter()
            .find(|(name, _)| !self.fields.iter().any(|f| f.name == *name))
        {
            return Err(TlvError::UnknownField {
                schema: self.name,
                field: unknown.to_owned(),
            });
        }

        let mut members = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            match record.get(spec.name) {
                Some(value) => members.push(Element::new(
                    Tag::Context(spec.tag),
                    self.encode_value(spec.name, spec.field_type, value)?,
                )),
                None if spec.optional => {}
                None => {
                    return Err(TlvError::MissingField {
                        schema: self.name,
                        field: spec.name,
                    });
                }
            }
        }
        Ok(Element::new(tag, Value::Structure(members)))
    }

    fn encode_value(
        &self,
        field: &'static str,
        field_type: FieldType,
        value: &FieldValue,
    ) -> Result<Value, TlvError> {
        Ok(match (field_type, value) {
            (FieldType::Unsigned, FieldValue::Unsigned(v)) => Value::Unsigned(*v),
            (FieldType::Signed, FieldValue::Signed(v)) => Value::Signed(*v),
            (FieldType::Bool, FieldValue::Bool(v)) => Value::Bool(*v),
            (FieldType::Utf8, FieldValue::Utf8(v)) => Value::Utf8(v.clone()),
            (FieldType::Bytes, FieldValue::Bytes(v)) => Value::Bytes(v.clone()),
            (FieldType::Struct(schema), FieldValue::Struct(record)) => {
                schema.to_element(Tag::Anonymous, record)?.value
            }
            (FieldType::Array(item_type), FieldValue::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| {
                        self.encode_value(field, *item_type, item)
                            .map(|v| Element::new(Tag::Anonymous, v))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            _ => {
                return Err(TlvError::FieldTypeMismatch {
                    schema: self.name,
                    field,
                });
            }
        })
    }

    /// Convert a structure element into a record.
    ///
    /// Members are matched to declared fields by context tag. Members with
    /// undeclared context tags are skipped; members with any other tag
    /// form are rejected.
    ///
    /// # Errors
    ///
    /// See [`StructSchema::decode`].
    pub fn from_element(&self, element: &Element) -> Result<Record, TlvError> {
        let Value::Structure(members) = &element.value else {
            return Err(TlvError::NotAStructure(self.name));
        };

        if let Some(stray) = members.iter().find(|m| !matches!(m.tag, Tag::Context(_))) {
            return Err(TlvError::UnexpectedTag {
                schema: self.name,
                tag: stray.tag.to_string(),
            });
        }

        let mut record = Record::new();
        for spec in &self.fields {
            match members.iter().find(|m| m.tag == Tag::Context(spec.tag)) {
                Some(member) => {
                    let value = self.decode_value(spec.name, spec.field_type, &member.value)?;
                    record.insert(spec.name, value);
                }
                None if spec.optional => {}
                None => {
                    return Err(TlvError::MissingField {
                        schema: self.name,
                        field: spec.name,
                    });
                }
            }
        }
        Ok(record)
    }

    fn decode_value(
        &self,
        field: &'static str,
        field_type: FieldType,
        value: &Value,
    ) -> Result<FieldValue, TlvError> {
        Ok(match (field_type, value) {
            (FieldType::Unsigned, Value::Unsigned(v)) => FieldValue::Unsigned(*v),
            (FieldType::Signed, Value::Signed(v)) => FieldValue::Signed(*v),
            (FieldType::Bool, Value::Bool(v)) => FieldValue::Bool(*v),
            (FieldType::Utf8, Value::Utf8(v)) => FieldValue::Utf8(v.clone()),
            (FieldType::Bytes, Value::Bytes(v)) => FieldValue::Bytes(v.clone()),
            (FieldType::Struct(schema), Value::Structure(_)) => FieldValue::Struct(
                schema.from_element(&Element::new(Tag::Anonymous, value.clone()))?,
            ),
            (FieldType::Array(item_type), Value::Array(items)) => FieldValue::Array(
                items
                    .iter()
                    .map(|item| self.decode_value(field, *item_type, &item.value))
                    .collect::<Result<_, _>>()?,
            ),
            _ => {
                return Err(TlvError::FieldTypeMismatch {
                    schema: self.name,
                    field,
                });
            }
        })
    }
}

/// A message with a fixed TLV structure.
pub trait TlvMessage: Sized {
    /// Schema shared by encoder and decoder.
    fn schema() -> &'static StructSchema;

    /// Convert to a record conforming to [`TlvMessage::schema`].
    fn to_record(&self) -> Record;

    /// Build from a decoded record.
    ///
    /// # Errors
    ///
    /// Returns a [`TlvError`] if a field is missing or out of range.
    fn from_record(record: &Record) -> Result<Self, TlvError>;

    /// Encode as TLV bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`TlvError`] if the record does not match the schema.
    fn encode(&self) -> Result<Vec<u8>, TlvError> {
        Self::schema().encode(&self.to_record())
    }

    /// Decode from TLV bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`TlvError`] for malformed or non-conforming input.
    fn decode(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_record(&Self::schema().decode(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::LazyLock;

    static INNER: LazyLock<StructSchema> = LazyLock::new(|| {
        StructSchema::builder("Inner")
            .field("iterations", 1, FieldType::Unsigned)
            .field("salt", 2, FieldType::Bytes)
            .build()
    });

    static OUTER: LazyLock<StructSchema> = LazyLock::new(|| {
        StructSchema::builder("Outer")
            .field("id", 1, FieldType::Unsigned)
            .field("flag", 2, FieldType::Bool)
            .optional("label", 3, FieldType::Utf8)
            .optional("params", 4, FieldType::Struct(&INNER))
            .optional("offsets", 5, FieldType::Array(&FieldType::Signed))
            .build()
    });

    fn sample() -> Record {
        Record::new()
            .with("id", FieldValue::Unsigned(70000))
            .with("flag", FieldValue::Bool(true))
            .with(
                "params",
                FieldValue::Struct(
                    Record::new()
                        .with("iterations", FieldValue::Unsigned(1000))
                        .with("salt", FieldValue::Bytes(vec![7; 16])),
                ),
            )
            .with(
                "offsets",
                FieldValue::Array(vec![FieldValue::Signed(-1), FieldValue::Signed(300)]),
            )
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample();
        let bytes = OUTER.encode(&record).unwrap();
        assert_eq!(OUTER.decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_encoding_follows_schema_order() {
        let record = Record::new()
            .with("flag", FieldValue::Bool(false))
            .with("id", FieldValue::Unsigned(1));
        let bytes = OUTER.encode(&record).unwrap();
        assert_eq!(bytes, vec![0x15, 0x24, 0x01, 0x01, 0x28, 0x02, 0x18]);
    }

    #[test]
    fn test_missing_required_field() {
        let record = Record::new().with("id", FieldValue::Unsigned(1));
        assert_eq!(
            OUTER.encode(&record),
            Err(TlvError::MissingField {
                schema: "Outer",
                field: "flag"
            })
        );

        // { 1: 1 } decodes without the flag
        assert!(matches!(
            OUTER.decode(&[0x15, 0x24, 0x01, 0x01, 0x18]),
            Err(TlvError::MissingField { field: "flag", .. })
        ));
    }

    #[test]
    fn test_wrong_type_rejected() {
        // flag encoded as unsigned
        let bytes = [0x15, 0x24, 0x01, 0x01, 0x24, 0x02, 0x01, 0x18];
        assert!(matches!(
            OUTER.decode(&bytes),
            Err(TlvError::FieldTypeMismatch { field: "flag", .. })
        ));

        let record = sample().with("label", FieldValue::Bytes(vec![1]));
        assert!(matches!(
            OUTER.encode(&record),
            Err(TlvError::FieldTypeMismatch { field: "label", .. })
        ));
    }

    #[test]
    fn test_unknown_record_field_rejected() {
        let record = sample().with("extra", FieldValue::Bool(true));
        assert!(matches!(
            OUTER.encode(&record),
            Err(TlvError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_undeclared_context_member_skipped() {
        // { 1: 1, 2: false, 9: true }
        let bytes = [0x15, 0x24, 0x01, 0x01, 0x28, 0x02, 0x29, 0x09, 0x18];
        let record = OUTER.decode(&bytes).unwrap();
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_non_context_member_rejected() {
        // { 1: 1, anonymous false }
        let bytes = [0x15, 0x24, 0x01, 0x01, 0x08, 0x18];
        assert!(matches!(
            OUTER.decode(&bytes),
            Err(TlvError::UnexpectedTag { .. })
        ));
    }

    #[test]
    fn test_not_a_structure() {
        assert_eq!(OUTER.decode(&[0x08]), Err(TlvError::NotAStructure("Outer")));
    }

    #[test]
    fn test_typed_accessors() {
        let record = sample();
        assert_eq!(record.unsigned::<u32>("id").unwrap(), 70000);
        assert_eq!(
            record.unsigned::<u16>("id"),
            Err(TlvError::OutOfRange("id"))
        );
        assert!(record.boolean("flag").unwrap());
        assert!(record.opt_bytes("label").unwrap().is_none());
        assert_eq!(
            record
                .opt_record("params")
                .unwrap()
                .unwrap()
                .byte_array::<16>("salt")
                .unwrap(),
            [7; 16]
        );
        assert!(record.opt_unsigned::<u8>("missing").unwrap().is_none());
    }

    const NAMES: [&str; 8] = ["f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7"];

    #[derive(Debug, Clone, Copy)]
    enum Scalar {
        Unsigned,
        Signed,
        Bool,
        Utf8,
        Bytes,
    }

    impl Scalar {
        fn field_type(self) -> FieldType {
            match self {
                Self::Unsigned => FieldType::Unsigned,
                Self::Signed => FieldType::Signed,
                Self::Bool => FieldType::Bool,
                Self::Utf8 => FieldType::Utf8,
                Self::Bytes => FieldType::Bytes,
            }
        }

        fn value(self) -> BoxedStrategy<FieldValue> {
            match self {
                Self::Unsigned => any::<u64>().prop_map(FieldValue::Unsigned).boxed(),
                Self::Signed => any::<i64>().prop_map(FieldValue::Signed).boxed(),
                Self::Bool => any::<bool>().prop_map(FieldValue::Bool).boxed(),
                Self::Utf8 => ".{0,16}".prop_map(FieldValue::Utf8).boxed(),
                Self::Bytes => prop::collection::vec(any::<u8>(), 0..40)
                    .prop_map(FieldValue::Bytes)
                    .boxed(),
            }
        }
    }

    /// A field type together with a conforming value.
    #[derive(Debug, Clone)]
    enum Shape {
        Leaf(Scalar, FieldValue),
        Array(Scalar, Vec<FieldValue>),
        Struct(Vec<Member>),
    }

    #[derive(Debug, Clone)]
    struct Member {
        optional: bool,
        present: bool,
        shape: Shape,
    }

    fn scalar() -> impl Strategy<Value = Scalar> {
        prop_oneof![
            Just(Scalar::Unsigned),
            Just(Scalar::Signed),
            Just(Scalar::Bool),
            Just(Scalar::Utf8),
            Just(Scalar::Bytes),
        ]
    }

    fn members(shape: BoxedStrategy<Shape>) -> impl Strategy<Value = Vec<Member>> {
        prop::collection::vec((any::<bool>(), any::<bool>(), shape), 0..6).prop_map(|fields| {
            fields
                .into_iter()
                .map(|(optional, present, shape)| Member {
                    optional,
                    // required fields are always present
                    present: present || !optional,
                    shape,
                })
                .collect()
        })
    }

    fn shape() -> BoxedStrategy<Shape> {
        let leaf = prop_oneof![
            scalar().prop_flat_map(|kind| kind.value().prop_map(move |v| Shape::Leaf(kind, v))),
            scalar().prop_flat_map(|kind| {
                prop::collection::vec(kind.value(), 0..4).prop_map(move |items| Shape::Array(kind, items))
            }),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| members(inner).prop_map(Shape::Struct))
            .boxed()
    }

    fn lower(shape: &Shape) -> (FieldType, FieldValue) {
        match shape {
            Shape::Leaf(kind, value) => (kind.field_type(), value.clone()),
            Shape::Array(kind, items) => (
                FieldType::Array(Box::leak(Box::new(kind.field_type()))),
                FieldValue::Array(items.clone()),
            ),
            Shape::Struct(members) => {
                let (schema, record) = build(members);
                (FieldType::Struct(schema), FieldValue::Struct(record))
            }
        }
    }

    fn build(members: &[Member]) -> (&'static StructSchema, Record) {
        let mut builder = StructSchema::builder("Generated");
        let mut record = Record::new();
        for (i, member) in members.iter().enumerate() {
            let (field_type, value) = lower(&member.shape);
            let tag = i as u8 + 1;
            builder = if member.optional {
                builder.optional(NAMES[i], tag, field_type)
            } else {
                builder.field(NAMES[i], tag, field_type)
            };
            if member.present {
                record.insert(NAMES[i], value);
            }
        }
        (Box::leak(Box::new(builder.build())), record)
    }

    proptest! {
        #[test]
        fn prop_generated_schema_roundtrip(fields in members(shape())) {
            let (schema, record) = build(&fields);
            let bytes = schema.encode(&record).unwrap();
            prop_assert_eq!(schema.decode(&bytes).unwrap(), record);
        }
    }
}
