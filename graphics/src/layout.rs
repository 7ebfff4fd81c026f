//! Record layout definitions.
//!
//! A [`Layout`] describes how one record (a vertex, or one instance) is laid
//! out in a buffer: an ordered list of named [`Attribute`]s, each with a kind
//! and an optional array length. Offsets are computed, never supplied: every
//! attribute starts where the previous one ends, so the record is tightly
//! packed and the stride is the sum of all attribute sizes.
//!
//! Layouts are immutable once built. They are typically wrapped in `Arc` and
//! shared between every buffer that stores records of the same shape.
//!
//! # Example
//!
//! ```
//! use glcore_graphics::{Attribute, AttributeKind, Layout};
//!
//! let layout = Layout::new([
//!     Attribute::new(AttributeKind::Vec3, "pos"),
//!     Attribute::new(AttributeKind::Vec3, "color"),
//! ]);
//!
//! assert_eq!(layout.stride(), 24);
//! assert_eq!(layout.attribute_by_name("color").unwrap().offset(), 12);
//! ```

use std::collections::HashMap;

use crate::error::GraphicsError;
use crate::types::AttributeKind;

/// A single named field of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    kind: AttributeKind,
    name: String,
    element_count: u32,
    offset: u32,
}

impl Attribute {
    /// Create a scalar/vector/matrix attribute.
    pub fn new(kind: AttributeKind, name: impl Into<String>) -> Self {
        Self::array(kind, name, 1)
    }

    /// Create an array attribute holding `element_count` consecutive elements.
    ///
    /// # Panics
    ///
    /// Panics if `element_count` is zero or the attribute size overflows `u32`.
    pub fn array(kind: AttributeKind, name: impl Into<String>, element_count: u32) -> Self {
        assert!(element_count > 0, "attribute element count must be positive");
        assert!(
            kind.size().checked_mul(element_count).is_some(),
            "attribute size overflows u32 ({} x {})",
            kind,
            element_count
        );
        Self {
            kind,
            name: name.into(),
            element_count,
            offset: 0,
        }
    }

    /// Single float attribute.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Float, name)
    }

    /// `vec2` attribute.
    pub fn vec2(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Vec2, name)
    }

    /// `vec3` attribute.
    pub fn vec3(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Vec3, name)
    }

    /// `vec4` attribute.
    pub fn vec4(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Vec4, name)
    }

    /// `mat3` attribute.
    pub fn mat3(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Mat3, name)
    }

    /// `mat4` attribute.
    pub fn mat4(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Mat4, name)
    }

    /// Kind of each element.
    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of elements (1 for non-array attributes).
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Byte offset within one record. Zero until the attribute is placed in a [`Layout`].
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Total size in bytes (`size(kind) * element_count`).
    pub fn size(&self) -> u32 {
        self.kind.size() * self.element_count
    }

    /// Total scalar components (`component_count(kind) * element_count`).
    pub fn component_count(&self) -> u32 {
        self.kind.component_count() * self.element_count
    }
}

/// Ordered, tightly packed description of one record.
///
/// Attribute order determines both byte offsets and binding slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    attributes: Vec<Attribute>,
    stride: u32,
    by_name: HashMap<String, usize>,
    label: Option<String>,
}

impl Layout {
    /// Build a layout, assigning offsets in declaration order.
    ///
    /// # Panics
    ///
    /// Panics if the stride overflows `u32`.
    pub fn new(attributes: impl IntoIterator<Item = Attribute>) -> Self {
        let mut attributes: Vec<Attribute> = attributes.into_iter().collect();
        let mut by_name = HashMap::with_capacity(attributes.len());
        let mut stride = 0u32;

        for (index, attr) in attributes.iter_mut().enumerate() {
            attr.offset = stride;
            stride = match stride.checked_add(attr.size()) {
                Some(stride) => stride,
                None => panic!("layout stride overflows u32 at attribute '{}'", attr.name),
            };

            if by_name.contains_key(&attr.name) {
                log::warn!(
                    "Layout: duplicate attribute name '{}', lookups resolve to the first one",
                    attr.name
                );
            } else {
                by_name.insert(attr.name.clone(), index);
            }
        }

        Self {
            attributes,
            stride,
            by_name,
            label: None,
        }
    }

    /// Start a builder.
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::default()
    }

    /// Total record size in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Record size in 4-byte scalars.
    pub fn stride_in_scalars(&self) -> u32 {
        self.stride / 4
    }

    /// All attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Iterate over attributes in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the layout has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Debug label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get an attribute by position.
    pub fn attribute_at(&self, index: usize) -> Result<&Attribute, GraphicsError> {
        self.attributes
            .get(index)
            .ok_or(GraphicsError::AttributeIndexOutOfRange {
                index,
                len: self.attributes.len(),
            })
    }

    /// Get an attribute by name.
    pub fn attribute_by_name(&self, name: &str) -> Result<&Attribute, GraphicsError> {
        self.by_name
            .get(name)
            .map(|&index| &self.attributes[index])
            .ok_or_else(|| GraphicsError::AttributeNotFound(name.to_string()))
    }

    /// Check if the layout has an attribute with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

impl<'a> IntoIterator for &'a Layout {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

/// Incremental construction of a [`Layout`].
///
/// ```
/// use glcore_graphics::{Attribute, AttributeKind, Layout};
///
/// let layout = Layout::builder()
///     .with_attribute(Attribute::vec3("offset"))
///     .with_attribute(Attribute::array(AttributeKind::Vec4, "bones", 2))
///     .with_label("instances")
///     .build();
/// assert_eq!(layout.stride(), 12 + 32);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LayoutBuilder {
    attributes: Vec<Attribute>,
    label: Option<String>,
}

impl LayoutBuilder {
    /// Append an attribute.
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Finish the layout.
    pub fn build(self) -> Layout {
        let mut layout = Layout::new(self.attributes);
        layout.label = self.label;
        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_color_layout() {
        let layout = Layout::new([Attribute::vec3("pos"), Attribute::vec3("color")]);

        assert_eq!(layout.stride(), 24);
        assert_eq!(layout.stride_in_scalars(), 6);
        assert_eq!(layout.attribute_by_name("pos").unwrap().offset(), 0);
        assert_eq!(layout.attribute_by_name("color").unwrap().offset(), 12);
    }

    #[test]
    fn test_offsets_follow_declaration_order() {
        // Names deliberately out of alphabetical order
        let layout = Layout::new([
            Attribute::vec4("zeta"),
            Attribute::float("alpha"),
            Attribute::mat3("model"),
            Attribute::array(AttributeKind::Vec2, "uv", 3),
        ]);

        let offsets: Vec<u32> = layout.iter().map(Attribute::offset).collect();
        assert_eq!(offsets, vec![0, 16, 20, 68]);
        assert_eq!(layout.stride(), 68 + 24);
    }

    #[test]
    fn test_offsets_are_running_sum() {
        let layout = Layout::new(
            AttributeKind::ALL
                .iter()
                .enumerate()
                .map(|(i, &kind)| Attribute::array(kind, format!("a{i}"), i as u32 + 1)),
        );

        let attrs = layout.attributes();
        assert_eq!(attrs[0].offset(), 0);
        for pair in attrs.windows(2) {
            assert_eq!(pair[1].offset(), pair[0].offset() + pair[0].size());
        }
        let last = attrs.last().unwrap();
        assert_eq!(layout.stride(), last.offset() + last.size());
    }

    #[test]
    fn test_attribute_at() {
        let layout = Layout::new([Attribute::vec2("uv")]);
        assert_eq!(layout.attribute_at(0).unwrap().name(), "uv");
        assert_eq!(
            layout.attribute_at(1),
            Err(GraphicsError::AttributeIndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_attribute_not_found() {
        let layout = Layout::new([Attribute::vec2("uv")]);
        assert_eq!(
            layout.attribute_by_name("normal"),
            Err(GraphicsError::AttributeNotFound("normal".to_string()))
        );
        assert!(!layout.contains("normal"));
    }

    #[test]
    fn test_duplicate_name_resolves_to_first() {
        let layout = Layout::new([Attribute::vec3("p"), Attribute::vec4("p")]);
        let attr = layout.attribute_by_name("p").unwrap();
        assert_eq!(attr.kind(), AttributeKind::Vec3);
        assert_eq!(layout.len(), 2);
    }

    #[test]
    fn test_clone_keeps_lookup() {
        let layout = Layout::new([Attribute::float("a"), Attribute::float("b")]);
        let copy = layout.clone();
        assert_eq!(copy, layout);
        assert_eq!(copy.attribute_by_name("b").unwrap().offset(), 4);
    }

    #[test]
    fn test_empty_layout() {
        let layout = Layout::new(Vec::<Attribute>::new());
        assert!(layout.is_empty());
        assert_eq!(layout.stride(), 0);
    }

    #[test]
    fn test_builder_label() {
        let layout = Layout::builder()
            .with_attribute(Attribute::mat4("model"))
            .with_label("per_instance")
            .build();
        assert_eq!(layout.label(), Some("per_instance"));
        assert_eq!(layout.stride(), 64);
    }

    #[test]
    #[should_panic(expected = "element count must be positive")]
    fn test_zero_element_count_panics() {
        let _ = Attribute::array(AttributeKind::Vec3, "bad", 0);
    }

    #[test]
    #[should_panic(expected = "attribute size overflows u32")]
    fn test_oversized_element_count_panics() {
        let _ = Attribute::array(AttributeKind::Mat4, "huge", 70_000_000);
    }

    #[test]
    #[should_panic(expected = "layout stride overflows u32")]
    fn test_stride_overflow_panics() {
        let half = u32::MAX / 2 / AttributeKind::Vec4.size() + 1;
        let _ = Layout::new([
            Attribute::array(AttributeKind::Vec4, "a", half),
            Attribute::array(AttributeKind::Vec4, "b", half),
        ]);
    }
}
