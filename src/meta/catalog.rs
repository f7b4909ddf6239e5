//! Template catalog.
//!
//! A template is a registered (ID, category, shape) triple. The set of
//! categories and shapes is closed; a catalog only decides which numeric ID
//! each combination travels under. The built-in catalog uses the standard
//! bands:
//!
//! - 128–146: unnamed scalars and the two group markers
//! - 166–176: extended unnamed scalars
//! - 192–240: named scalars
//! - 384–433: nullable scalars
//! - 448–497: named nullable scalars
//!
//! Catalogs are immutable once built and are shared behind an `Arc`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::error::{CodecError, CodecResult};

// ============================================================================
// Template Identity
// ============================================================================

/// Numeric template identifier as it appears in a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub u32);

impl TemplateId {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value layout carried by a scalar template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    UInt32,
    Int32,
    Int64,
    #[serde(rename = "ASCII")]
    Ascii,
    #[serde(rename = "UTF8")]
    Utf8,
    Decimal,
    ByteArray,
    Boolean,
    Float,
    Double,
    DateTime,
    SerializedObject,
    Timestamp,
}

impl Shape {
    pub const ALL: [Shape; 13] = [
        Shape::UInt32,
        Shape::Int32,
        Shape::Int64,
        Shape::Ascii,
        Shape::Utf8,
        Shape::Decimal,
        Shape::ByteArray,
        Shape::Boolean,
        Shape::Float,
        Shape::Double,
        Shape::DateTime,
        Shape::SerializedObject,
        Shape::Timestamp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Shape::UInt32 => "UInt32",
            Shape::Int32 => "Int32",
            Shape::Int64 => "Int64",
            Shape::Ascii => "ASCII",
            Shape::Utf8 => "UTF8",
            Shape::Decimal => "Decimal",
            Shape::ByteArray => "ByteArray",
            Shape::Boolean => "Boolean",
            Shape::Float => "Float",
            Shape::Double => "Double",
            Shape::DateTime => "DateTime",
            Shape::SerializedObject => "SerializedObject",
            Shape::Timestamp => "Timestamp",
        }
    }

    /// Wire field carrying this shape's value.
    pub fn value_field(self) -> WireField {
        match self {
            Shape::UInt32 => WireField::UInt32,
            Shape::Int32 => WireField::Int32,
            Shape::Int64 => WireField::Int64,
            Shape::Ascii => WireField::Ascii,
            Shape::Utf8 => WireField::Utf8,
            Shape::Decimal => WireField::Decimal,
            Shape::ByteArray => WireField::Bytes,
            Shape::Boolean => WireField::BooleanInt,
            Shape::Float => WireField::Float,
            Shape::Double => WireField::Double,
            Shape::DateTime => WireField::DateTime,
            Shape::SerializedObject => WireField::Object,
            Shape::Timestamp => WireField::Timestamp,
        }
    }
}

/// Template category: the name/nullability cross product plus the markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Scalar,
    Named,
    Nullable,
    NamedNullable,
    BeginGroup,
    EndGroup,
}

const SCALAR_BANDS: &[RangeInclusive<u32>] = &[128..=146, 166..=176];
const MARKER_BANDS: &[RangeInclusive<u32>] = &[128..=146];
const NAMED_BANDS: &[RangeInclusive<u32>] = &[192..=240];
const NULLABLE_BANDS: &[RangeInclusive<u32>] = &[384..=433];
const NAMED_NULLABLE_BANDS: &[RangeInclusive<u32>] = &[448..=497];

impl Category {
    #[inline]
    pub fn is_named(self) -> bool {
        matches!(self, Category::Named | Category::NamedNullable)
    }

    #[inline]
    pub fn is_nullable(self) -> bool {
        matches!(self, Category::Nullable | Category::NamedNullable)
    }

    #[inline]
    pub fn is_marker(self) -> bool {
        matches!(self, Category::BeginGroup | Category::EndGroup)
    }

    /// Category for a scalar with the given name/nullability.
    pub fn for_scalar(named: bool, nullable: bool) -> Self {
        match (named, nullable) {
            (false, false) => Category::Scalar,
            (true, false) => Category::Named,
            (false, true) => Category::Nullable,
            (true, true) => Category::NamedNullable,
        }
    }

    /// ID bands a template of this category may use.
    pub fn bands(self) -> &'static [RangeInclusive<u32>] {
        match self {
            Category::Scalar => SCALAR_BANDS,
            Category::BeginGroup | Category::EndGroup => MARKER_BANDS,
            Category::Named => NAMED_BANDS,
            Category::Nullable => NULLABLE_BANDS,
            Category::NamedNullable => NAMED_NULLABLE_BANDS,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Category::Scalar => "",
            Category::Named => "Named",
            Category::Nullable => "Nullable",
            Category::NamedNullable => "NamedNullable",
            Category::BeginGroup => "BeginGroup",
            Category::EndGroup => "EndGroup",
        }
    }
}

/// Kind of one field in a template's wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireField {
    Ascii,
    Utf8,
    UInt32,
    Int32,
    Int64,
    Float,
    Double,
    Decimal,
    Bytes,
    BooleanInt,
    DateTime,
    /// DateTime + nanosecond remainder + offset minutes
    Timestamp,
    Object,
    NotNullFlag,
}

// ============================================================================
// Templates
// ============================================================================

/// A registered template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    id: TemplateId,
    name: String,
    category: Category,
    shape: Option<Shape>,
    fields: SmallVec<[WireField; 3]>,
}

impl Template {
    fn new(id: u32, name: Option<String>, category: Category, shape: Option<Shape>) -> Self {
        let name = name.unwrap_or_else(|| canonical_name(category, shape));
        let fields = match (category, shape) {
            (_, None) => SmallVec::new(),
            (Category::Scalar, Some(s)) => smallvec![s.value_field()],
            (Category::Named, Some(s)) => smallvec![WireField::Ascii, s.value_field()],
            (Category::Nullable, Some(s)) => smallvec![WireField::NotNullFlag, s.value_field()],
            (Category::NamedNullable, Some(s)) => {
                smallvec![WireField::Ascii, WireField::NotNullFlag, s.value_field()]
            }
            (Category::BeginGroup | Category::EndGroup, Some(_)) => SmallVec::new(),
        };
        Self {
            id: TemplateId(id),
            name,
            category,
            shape,
            fields,
        }
    }

    #[inline]
    pub fn id(&self) -> TemplateId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    #[inline]
    pub fn shape(&self) -> Option<Shape> {
        self.shape
    }

    /// Ordered wire fields after the header.
    pub fn fields(&self) -> &[WireField] {
        &self.fields
    }
}

fn canonical_name(category: Category, shape: Option<Shape>) -> String {
    match shape {
        Some(s) if !category.is_marker() => format!("{}{}", category.prefix(), s.name()),
        _ => category.prefix().to_string(),
    }
}

/// One entry of a catalog artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
}

// ============================================================================
// Catalog
// ============================================================================

/// Standard ID assignment: (shape, [scalar, named, nullable, named-nullable]).
const BUILTIN_IDS: [(Shape, [u32; 4]); 13] = [
    (Shape::UInt32, [128, 192, 384, 448]),
    (Shape::Int32, [130, 194, 386, 450]),
    (Shape::Int64, [134, 198, 390, 454]),
    (Shape::Ascii, [136, 200, 392, 456]),
    (Shape::Utf8, [138, 202, 394, 458]),
    (Shape::Decimal, [140, 204, 396, 460]),
    (Shape::ByteArray, [142, 206, 398, 462]),
    (Shape::Boolean, [166, 230, 423, 487]),
    (Shape::Float, [168, 232, 425, 489]),
    (Shape::Double, [170, 234, 427, 491]),
    (Shape::DateTime, [172, 236, 429, 493]),
    (Shape::SerializedObject, [174, 238, 431, 495]),
    (Shape::Timestamp, [176, 240, 433, 497]),
];

pub const BEGIN_GROUP_ID: u32 = 144;
pub const END_GROUP_ID: u32 = 146;

static BUILTIN: Lazy<Arc<Catalog>> = Lazy::new(|| {
    let mut templates = Vec::with_capacity(BUILTIN_IDS.len() * 4 + 2);
    for (shape, ids) in BUILTIN_IDS {
        let categories = [
            Category::Scalar,
            Category::Named,
            Category::Nullable,
            Category::NamedNullable,
        ];
        for (category, id) in categories.into_iter().zip(ids) {
            templates.push(Template::new(id, None, category, Some(shape)));
        }
    }
    templates.push(Template::new(BEGIN_GROUP_ID, None, Category::BeginGroup, None));
    templates.push(Template::new(END_GROUP_ID, None, Category::EndGroup, None));
    Arc::new(Catalog::assemble(templates))
});

/// Immutable registry of templates, indexed by ID, name and (category, shape).
#[derive(Debug)]
pub struct Catalog {
    templates: Vec<Template>,
    by_id: HashMap<TemplateId, usize>,
    by_name: HashMap<String, usize>,
    by_key: HashMap<(Category, Option<Shape>), usize>,
}

impl Catalog {
    /// The process-wide catalog with the standard ID bands.
    pub fn builtin() -> Arc<Catalog> {
        Arc::clone(&BUILTIN)
    }

    /// Build a catalog from artifact entries, checking IDs, names and bands.
    pub fn from_entries(entries: Vec<TemplateEntry>) -> CodecResult<Self> {
        let mut templates = Vec::with_capacity(entries.len());
        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        let mut seen_keys = HashSet::new();

        for entry in entries {
            match (entry.category.is_marker(), entry.shape) {
                (true, Some(shape)) => {
                    return Err(CodecError::ConfigError(format!(
                        "template {} is a group marker but declares shape {}",
                        entry.id,
                        shape.name()
                    )))
                }
                (false, None) => {
                    return Err(CodecError::ConfigError(format!(
                        "template {} is a scalar template without a shape",
                        entry.id
                    )))
                }
                _ => {}
            }

            if !entry.category.bands().iter().any(|band| band.contains(&entry.id)) {
                return Err(CodecError::ConfigError(format!(
                    "template {} is outside the ID bands for {:?}",
                    entry.id, entry.category
                )));
            }

            let template = Template::new(entry.id, entry.name, entry.category, entry.shape);
            if !seen_ids.insert(template.id) {
                return Err(CodecError::ConfigError(format!(
                    "duplicate template ID {}",
                    template.id
                )));
            }
            if !seen_names.insert(template.name.clone()) {
                return Err(CodecError::ConfigError(format!(
                    "duplicate template name {}",
                    template.name
                )));
            }
            if !seen_keys.insert((template.category, template.shape)) {
                return Err(CodecError::ConfigError(format!(
                    "template {} repeats an existing category/shape pair",
                    template.id
                )));
            }
            templates.push(template);
        }

        Ok(Self::assemble(templates))
    }

    /// Parse and validate a JSON catalog artifact (an array of entries).
    pub fn from_json(json: &str) -> CodecResult<Self> {
        let entries: Vec<TemplateEntry> = serde_json::from_str(json)?;
        Self::from_entries(entries)
    }

    /// Load a JSON catalog artifact from disk.
    pub fn from_path(path: impl AsRef<Path>) -> CodecResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn assemble(templates: Vec<Template>) -> Self {
        let mut by_id = HashMap::with_capacity(templates.len());
        let mut by_name = HashMap::with_capacity(templates.len());
        let mut by_key = HashMap::with_capacity(templates.len());
        for (idx, t) in templates.iter().enumerate() {
            by_id.insert(t.id, idx);
            by_name.insert(t.name.clone(), idx);
            by_key.insert((t.category, t.shape), idx);
        }
        Self {
            templates,
            by_id,
            by_name,
            by_key,
        }
    }

    /// Entries describing this catalog, suitable for writing an artifact.
    pub fn to_entries(&self) -> Vec<TemplateEntry> {
        self.templates
            .iter()
            .map(|t| TemplateEntry {
                id: t.id.0,
                name: Some(t.name.clone()),
                category: t.category,
                shape: t.shape,
            })
            .collect()
    }

    pub fn by_id(&self, id: TemplateId) -> CodecResult<&Template> {
        self.by_id
            .get(&id)
            .map(|&idx| &self.templates[idx])
            .ok_or_else(|| CodecError::CatalogLookup(format!("template ID {}", id)))
    }

    pub fn by_name(&self, name: &str) -> CodecResult<&Template> {
        self.by_name
            .get(name)
            .map(|&idx| &self.templates[idx])
            .ok_or_else(|| CodecError::CatalogLookup(format!("template name {}", name)))
    }

    /// Template for a scalar of `shape` with the given name/nullability.
    pub fn select(&self, shape: Shape, named: bool, nullable: bool) -> CodecResult<&Template> {
        let category = Category::for_scalar(named, nullable);
        self.lookup(category, Some(shape))
    }

    /// Template for a group marker.
    pub fn marker(&self, begin: bool) -> CodecResult<&Template> {
        let category = if begin {
            Category::BeginGroup
        } else {
            Category::EndGroup
        };
        self.lookup(category, None)
    }

    fn lookup(&self, category: Category, shape: Option<Shape>) -> CodecResult<&Template> {
        self.by_key
            .get(&(category, shape))
            .map(|&idx| &self.templates[idx])
            .ok_or_else(|| CodecError::CatalogLookup(canonical_name(category, shape)))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_complete() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.len(), 13 * 4 + 2);

        for shape in Shape::ALL {
            for (named, nullable) in [(false, false), (true, false), (false, true), (true, true)] {
                let t = catalog.select(shape, named, nullable).unwrap();
                assert_eq!(t.shape(), Some(shape));
                assert_eq!(t.category().is_named(), named);
                assert_eq!(t.category().is_nullable(), nullable);
            }
        }
    }

    #[test]
    fn test_builtin_ids_stay_in_their_bands() {
        let catalog = Catalog::builtin();
        for t in catalog.iter() {
            let id = t.id().as_u32();
            assert!(
                t.category().bands().iter().any(|b| b.contains(&id)),
                "{} ({}) outside its band",
                t.name(),
                id
            );
        }
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let catalog = Catalog::builtin();

        let t = catalog.by_id(TemplateId(130)).unwrap();
        assert_eq!(t.name(), "Int32");
        assert_eq!(t.fields(), &[WireField::Int32]);

        let t = catalog.by_name("NamedNullableTimestamp").unwrap();
        assert_eq!(t.id(), TemplateId(497));
        assert_eq!(
            t.fields(),
            &[WireField::Ascii, WireField::NotNullFlag, WireField::Timestamp]
        );

        assert_eq!(catalog.marker(true).unwrap().id(), TemplateId(144));
        assert_eq!(catalog.marker(false).unwrap().name(), "EndGroup");
    }

    #[test]
    fn test_unknown_lookups_fail() {
        let catalog = Catalog::builtin();
        assert!(matches!(
            catalog.by_id(TemplateId(132)),
            Err(CodecError::CatalogLookup(_))
        ));
        assert!(matches!(
            catalog.by_name("NamedUInt64"),
            Err(CodecError::CatalogLookup(_))
        ));
    }

    #[test]
    fn test_artifact_roundtrip() {
        let builtin = Catalog::builtin();
        let json = serde_json::to_string(&builtin.to_entries()).unwrap();
        let loaded = Catalog::from_json(&json).unwrap();

        assert_eq!(loaded.len(), builtin.len());
        for t in builtin.iter() {
            assert_eq!(loaded.by_id(t.id()).unwrap(), t);
        }
    }

    #[test]
    fn test_artifact_rejects_duplicate_ids() {
        let json = r#"[
            {"id": 130, "category": "scalar", "shape": "Int32"},
            {"id": 130, "category": "scalar", "shape": "Int64"}
        ]"#;
        assert!(matches!(
            Catalog::from_json(json),
            Err(CodecError::ConfigError(_))
        ));
    }

    #[test]
    fn test_artifact_rejects_out_of_band_ids() {
        let json = r#"[{"id": 300, "category": "named", "shape": "Int32"}]"#;
        assert!(matches!(
            Catalog::from_json(json),
            Err(CodecError::ConfigError(_))
        ));
    }

    #[test]
    fn test_artifact_rejects_marker_with_shape() {
        let json = r#"[{"id": 144, "category": "begin-group", "shape": "Int32"}]"#;
        assert!(matches!(
            Catalog::from_json(json),
            Err(CodecError::ConfigError(_))
        ));
    }

    #[test]
    fn test_partial_catalog_reports_missing_variant() {
        let json = r#"[
            {"id": 130, "category": "scalar", "shape": "Int32"},
            {"id": 144, "category": "begin-group"}
        ]"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.by_id(TemplateId(130)).unwrap().name(), "Int32");
        assert!(matches!(
            catalog.select(Shape::Int32, true, false),
            Err(CodecError::CatalogLookup(_))
        ));
        assert!(matches!(
            catalog.marker(false),
            Err(CodecError::CatalogLookup(_))
        ));
    }
}
