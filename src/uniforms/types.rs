//! Uniform Types & Values
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`UniformType`] | GLSL type of one atomic uniform |
//! | [`UniformValue`] | Closed sum over every supported value shape |
//! | [`UniformData`] | Maps a Rust type onto exactly one [`UniformValue`] alternative |
//! | [`StoredValue`] | Normalized storage: one shape per scalar kind |
//!
//! Storage is normalized to the widest shape of each scalar kind: every
//! float scalar/vector is stored as a [`Vec4`], every matrix as a [`Mat4`],
//! and so on. Values are widened on write and narrowed back to the declared
//! [`UniformType`] on read.

use std::fmt;

use glam::{
    BVec2, BVec3, BVec4, IVec2, IVec3, IVec4, Mat2, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3,
    Vec4,
};
use serde::{Deserialize, Serialize};

// ─── TextureHandle ────────────────────────────────────────────────────────────

/// Opaque texture resource bound to a sampler uniform.
///
/// The shading layer never dereferences it; the device maps it to a texture
/// unit binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    /// The "no texture" handle.
    pub const NULL: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

// ─── UniformType ──────────────────────────────────────────────────────────────

macro_rules! uniform_types {
    ($($variant:ident => $glsl:literal),* $(,)?) => {
        /// GLSL type of an atomic (non-struct) uniform.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum UniformType {
            $($variant,)*
        }

        impl UniformType {
            /// Every supported type, in declaration order.
            pub const ALL: &'static [UniformType] = &[$(UniformType::$variant,)*];

            /// GLSL spelling of the type.
            #[must_use]
            pub const fn glsl_name(self) -> &'static str {
                match self {
                    $(UniformType::$variant => $glsl,)*
                }
            }

            /// Parses a GLSL type name. Struct names return `None`.
            #[must_use]
            pub fn from_glsl(name: &str) -> Option<Self> {
                match name {
                    $($glsl => Some(UniformType::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

uniform_types! {
    Float => "float",
    Vec2 => "vec2",
    Vec3 => "vec3",
    Vec4 => "vec4",
    Int => "int",
    IVec2 => "ivec2",
    IVec3 => "ivec3",
    IVec4 => "ivec4",
    UInt => "uint",
    UVec2 => "uvec2",
    UVec3 => "uvec3",
    UVec4 => "uvec4",
    Bool => "bool",
    BVec2 => "bvec2",
    BVec3 => "bvec3",
    BVec4 => "bvec4",
    Mat2 => "mat2",
    Mat3 => "mat3",
    Mat4 => "mat4",
    Sampler2D => "sampler2D",
    Sampler3D => "sampler3D",
    SamplerCube => "samplerCube",
    Sampler2DArray => "sampler2DArray",
    Sampler2DShadow => "sampler2DShadow",
    ISampler2D => "isampler2D",
    USampler2D => "usampler2D",
}

impl UniformType {
    /// Whether the type is an opaque sampler bound to a texture.
    #[must_use]
    pub const fn is_sampler(self) -> bool {
        matches!(
            self,
            Self::Sampler2D
                | Self::Sampler3D
                | Self::SamplerCube
                | Self::Sampler2DArray
                | Self::Sampler2DShadow
                | Self::ISampler2D
                | Self::USampler2D
        )
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl_name())
    }
}

// ─── UniformValue ─────────────────────────────────────────────────────────────

/// A single uniform value of any supported shape.
///
/// This is the one entry point through which materials and the device
/// exchange values; the tag selects the dispatch path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Int(i32),
    IVec2(IVec2),
    IVec3(IVec3),
    IVec4(IVec4),
    UInt(u32),
    UVec2(UVec2),
    UVec3(UVec3),
    UVec4(UVec4),
    Bool(bool),
    BVec2(BVec2),
    BVec3(BVec3),
    BVec4(BVec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
    Texture(TextureHandle),
}

impl UniformValue {
    /// Whether this value can be written to a uniform of type `ty`.
    ///
    /// Non-sampler types must match exactly; a texture matches any sampler.
    #[must_use]
    pub fn matches(&self, ty: UniformType) -> bool {
        match self {
            Self::Texture(_) => ty.is_sampler(),
            _ => self.uniform_type() == Some(ty),
        }
    }

    /// Exact GLSL type of the value. Textures have no single type.
    #[must_use]
    pub const fn uniform_type(&self) -> Option<UniformType> {
        Some(match self {
            Self::Float(_) => UniformType::Float,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Int(_) => UniformType::Int,
            Self::IVec2(_) => UniformType::IVec2,
            Self::IVec3(_) => UniformType::IVec3,
            Self::IVec4(_) => UniformType::IVec4,
            Self::UInt(_) => UniformType::UInt,
            Self::UVec2(_) => UniformType::UVec2,
            Self::UVec3(_) => UniformType::UVec3,
            Self::UVec4(_) => UniformType::UVec4,
            Self::Bool(_) => UniformType::Bool,
            Self::BVec2(_) => UniformType::BVec2,
            Self::BVec3(_) => UniformType::BVec3,
            Self::BVec4(_) => UniformType::BVec4,
            Self::Mat2(_) => UniformType::Mat2,
            Self::Mat3(_) => UniformType::Mat3,
            Self::Mat4(_) => UniformType::Mat4,
            Self::Texture(_) => return None,
        })
    }

    /// Short name of the alternative, for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self.uniform_type() {
            Some(ty) => ty.glsl_name(),
            None => "texture",
        }
    }

    /// The value a freshly linked program holds for a uniform of type `ty`.
    #[must_use]
    pub fn zero(ty: UniformType) -> Self {
        StoredValue::zero(ty).load(ty)
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Vec2(v) => write!(f, "{v}"),
            Self::Vec3(v) => write!(f, "{v}"),
            Self::Vec4(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::IVec2(v) => write!(f, "{v}"),
            Self::IVec3(v) => write!(f, "{v}"),
            Self::IVec4(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::UVec2(v) => write!(f, "{v}"),
            Self::UVec3(v) => write!(f, "{v}"),
            Self::UVec4(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::BVec2(v) => write!(f, "{v}"),
            Self::BVec3(v) => write!(f, "{v}"),
            Self::BVec4(v) => write!(f, "{v}"),
            Self::Mat2(v) => write!(f, "{v}"),
            Self::Mat3(v) => write!(f, "{v}"),
            Self::Mat4(v) => write!(f, "{v}"),
            Self::Texture(t) => write!(f, "texture#{}", t.0),
        }
    }
}

// ─── UniformData ──────────────────────────────────────────────────────────────

/// A Rust type usable with the typed uniform accessors.
///
/// Each implementor corresponds to exactly one [`UniformValue`] alternative.
pub trait UniformData: Sized + Copy {
    /// Name used in type-mismatch diagnostics.
    const NAME: &'static str;

    /// Whether a uniform of type `ty` holds this Rust type.
    fn accepts(ty: UniformType) -> bool;

    fn into_value(self) -> UniformValue;

    fn from_value(value: UniformValue) -> Option<Self>;
}

macro_rules! impl_uniform_data {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        $(
            impl UniformData for $rust {
                const NAME: &'static str = UniformType::$variant.glsl_name();

                #[inline]
                fn accepts(ty: UniformType) -> bool {
                    ty == UniformType::$variant
                }

                #[inline]
                fn into_value(self) -> UniformValue {
                    UniformValue::$variant(self)
                }

                #[inline]
                fn from_value(value: UniformValue) -> Option<Self> {
                    match value {
                        UniformValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<$rust> for UniformValue {
                #[inline]
                fn from(v: $rust) -> Self {
                    UniformValue::$variant(v)
                }
            }
        )*
    };
}

impl_uniform_data! {
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    i32 => Int,
    IVec2 => IVec2,
    IVec3 => IVec3,
    IVec4 => IVec4,
    u32 => UInt,
    UVec2 => UVec2,
    UVec3 => UVec3,
    UVec4 => UVec4,
    bool => Bool,
    BVec2 => BVec2,
    BVec3 => BVec3,
    BVec4 => BVec4,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
}

impl UniformData for TextureHandle {
    const NAME: &'static str = "texture";

    #[inline]
    fn accepts(ty: UniformType) -> bool {
        ty.is_sampler()
    }

    #[inline]
    fn into_value(self) -> UniformValue {
        UniformValue::Texture(self)
    }

    #[inline]
    fn from_value(value: UniformValue) -> Option<Self> {
        match value {
            UniformValue::Texture(t) => Some(t),
            _ => None,
        }
    }
}

impl From<TextureHandle> for UniformValue {
    #[inline]
    fn from(t: TextureHandle) -> Self {
        UniformValue::Texture(t)
    }
}

// ─── StoredValue ──────────────────────────────────────────────────────────────

/// Normalized storage cell: the widest shape of each scalar kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoredValue {
    Float(Vec4),
    Int(IVec4),
    UInt(UVec4),
    Bool(BVec4),
    Matrix(Mat4),
    Texture(TextureHandle),
}

impl StoredValue {
    /// Zero cell of the storage kind used for `ty`.
    #[must_use]
    pub fn zero(ty: UniformType) -> Self {
        use UniformType as T;
        match ty {
            T::Float | T::Vec2 | T::Vec3 | T::Vec4 => Self::Float(Vec4::ZERO),
            T::Int | T::IVec2 | T::IVec3 | T::IVec4 => Self::Int(IVec4::ZERO),
            T::UInt | T::UVec2 | T::UVec3 | T::UVec4 => Self::UInt(UVec4::ZERO),
            T::Bool | T::BVec2 | T::BVec3 | T::BVec4 => Self::Bool(BVec4::FALSE),
            T::Mat2 | T::Mat3 | T::Mat4 => Self::Matrix(Mat4::ZERO),
            _ => Self::Texture(TextureHandle::NULL),
        }
    }

    /// Widens a value into its storage cell. Missing components are zero;
    /// smaller matrices are embedded in the upper-left corner of an identity.
    #[must_use]
    pub fn store(value: UniformValue) -> Self {
        use UniformValue as V;
        match value {
            V::Float(v) => Self::Float(Vec4::new(v, 0.0, 0.0, 0.0)),
            V::Vec2(v) => Self::Float(v.extend(0.0).extend(0.0)),
            V::Vec3(v) => Self::Float(v.extend(0.0)),
            V::Vec4(v) => Self::Float(v),
            V::Int(v) => Self::Int(IVec4::new(v, 0, 0, 0)),
            V::IVec2(v) => Self::Int(v.extend(0).extend(0)),
            V::IVec3(v) => Self::Int(v.extend(0)),
            V::IVec4(v) => Self::Int(v),
            V::UInt(v) => Self::UInt(UVec4::new(v, 0, 0, 0)),
            V::UVec2(v) => Self::UInt(v.extend(0).extend(0)),
            V::UVec3(v) => Self::UInt(v.extend(0)),
            V::UVec4(v) => Self::UInt(v),
            V::Bool(v) => Self::Bool(BVec4::new(v, false, false, false)),
            V::BVec2(v) => Self::Bool(BVec4::new(v.x, v.y, false, false)),
            V::BVec3(v) => Self::Bool(BVec4::new(v.x, v.y, v.z, false)),
            V::BVec4(v) => Self::Bool(v),
            V::Mat2(m) => Self::Matrix(Mat4::from_mat3(Mat3::from_mat2(m))),
            V::Mat3(m) => Self::Matrix(Mat4::from_mat3(m)),
            V::Mat4(m) => Self::Matrix(m),
            V::Texture(t) => Self::Texture(t),
        }
    }

    /// Narrows the cell back to the shape of `ty`.
    ///
    /// A cell of the wrong kind for `ty` reads as the zero of `ty`; the typed
    /// accessors assert the kind before ever reaching this point.
    #[must_use]
    pub fn load(&self, ty: UniformType) -> UniformValue {
        use UniformType as T;
        use UniformValue as V;
        match (*self, ty) {
            (Self::Float(v), T::Float) => V::Float(v.x),
            (Self::Float(v), T::Vec2) => V::Vec2(v.truncate().truncate()),
            (Self::Float(v), T::Vec3) => V::Vec3(v.truncate()),
            (Self::Float(v), T::Vec4) => V::Vec4(v),
            (Self::Int(v), T::Int) => V::Int(v.x),
            (Self::Int(v), T::IVec2) => V::IVec2(v.truncate().truncate()),
            (Self::Int(v), T::IVec3) => V::IVec3(v.truncate()),
            (Self::Int(v), T::IVec4) => V::IVec4(v),
            (Self::UInt(v), T::UInt) => V::UInt(v.x),
            (Self::UInt(v), T::UVec2) => V::UVec2(v.truncate().truncate()),
            (Self::UInt(v), T::UVec3) => V::UVec3(v.truncate()),
            (Self::UInt(v), T::UVec4) => V::UVec4(v),
            (Self::Bool(v), T::Bool) => V::Bool(v.x),
            (Self::Bool(v), T::BVec2) => V::BVec2(BVec2::new(v.x, v.y)),
            (Self::Bool(v), T::BVec3) => V::BVec3(BVec3::new(v.x, v.y, v.z)),
            (Self::Bool(v), T::BVec4) => V::BVec4(v),
            (Self::Matrix(m), T::Mat2) => V::Mat2(Mat2::from_mat3(Mat3::from_mat4(m))),
            (Self::Matrix(m), T::Mat3) => V::Mat3(Mat3::from_mat4(m)),
            (Self::Matrix(m), T::Mat4) => V::Mat4(m),
            (Self::Texture(t), ty) if ty.is_sampler() => V::Texture(t),
            (_, ty) => Self::zero(ty).load(ty),
        }
    }
}
