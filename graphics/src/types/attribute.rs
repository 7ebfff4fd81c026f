//! Attribute kinds and their decomposition into scalar components.
//!
//! The set of kinds is closed: every record field is composed of 32-bit floats,
//! so sizes are always a multiple of 4 bytes. Matrices are stored column-wise
//! with every column padded to a `vec4`, which is why a `mat3` occupies the
//! footprint of three `vec4`s rather than three `vec3`s.

/// Type of a single record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Vec2,
    /// Three 32-bit floats.
    Vec3,
    /// Four 32-bit floats.
    Vec4,
    /// 3x3 matrix, three `vec4`-padded columns.
    Mat3,
    /// 4x4 matrix, four `vec4` columns.
    Mat4,
}

impl AttributeKind {
    /// All supported kinds.
    pub const ALL: [AttributeKind; 6] = [
        Self::Float,
        Self::Vec2,
        Self::Vec3,
        Self::Vec4,
        Self::Mat3,
        Self::Mat4,
    ];

    /// Size in bytes of one element of this kind.
    pub const fn size(self) -> u32 {
        self.component_count() * self.scalar_type().size()
    }

    /// Number of scalar components in one element.
    pub const fn component_count(self) -> u32 {
        match self {
            Self::Float => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Mat3 => 12,
            Self::Mat4 => 16,
        }
    }

    /// Underlying scalar type of every component.
    pub const fn scalar_type(self) -> ScalarType {
        match self {
            Self::Float | Self::Vec2 | Self::Vec3 | Self::Vec4 | Self::Mat3 | Self::Mat4 => {
                ScalarType::Float32
            }
        }
    }

    /// Decompose into `(component_count, scalar_type)`.
    pub const fn decompose(self) -> (u32, ScalarType) {
        (self.component_count(), self.scalar_type())
    }

    /// Components per column. Vectors are a single column; matrix columns are `vec4`s.
    pub const fn column_components(self) -> u32 {
        match self {
            Self::Float => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat3 | Self::Mat4 => 4,
        }
    }

    /// Number of columns in one element.
    pub const fn columns(self) -> u32 {
        self.component_count() / self.column_components()
    }

    /// Shading-language name, for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
        }
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar type of attribute components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// IEEE-754 single precision float.
    Float32,
}

impl ScalarType {
    /// Size in bytes of one scalar.
    pub const fn size(self) -> u32 {
        match self {
            Self::Float32 => 4,
        }
    }
}

/// How an attribute advances while drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepMode {
    /// Advances once per vertex (default).
    #[default]
    Vertex,
    /// Advances once per drawn instance (divisor 1).
    Instance,
}

impl StepMode {
    /// Attribute divisor for this step mode.
    pub const fn divisor(self) -> u32 {
        match self {
            Self::Vertex => 0,
            Self::Instance => 1,
        }
    }
}
