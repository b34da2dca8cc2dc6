//! Graphics Device Abstraction
//!
//! The shading pipeline never talks to a graphics API directly. Everything it
//! needs from the driver goes through [`GraphicsDevice`], a handle-issuing
//! service modelled on the classic program-object API:
//!
//! | Concern | Operations |
//! |---------|-----------|
//! | Stage objects | `create_stage`, `compile_stage`, `stage_log`, `delete_stage` |
//! | Program objects | `create_program`, `attach_stage`, `detach_stage`, `link_program`, `link_status`, `program_log`, `delete_program` |
//! | Program binaries | `load_program_binary`, `program_binary` |
//! | Uniforms | `uniform_location`, `set_uniform`, `use_program` |
//!
//! All operations are infallible to call; failures are reported through
//! their boolean or `Option` results and the associated info logs.
//!
//! [`HeadlessDevice`] is a complete software implementation used by tests,
//! tools and benchmarks.

pub mod headless;

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::shader::ShaderStage;
use crate::uniforms::UniformValue;

pub use headless::{DeviceStats, HeadlessDevice};

// ─── Handles ──────────────────────────────────────────────────────────────────

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u32);

        impl $name {
            /// The invalid handle. Devices never issue it.
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
    };
}

define_handle!(
    /// A shader stage object.
    StageHandle
);

define_handle!(
    /// A program object.
    ProgramHandle
);

/// A uniform location inside one linked program.
///
/// Elements of an array uniform occupy consecutive locations, so element `i`
/// lives at `base.offset(i)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformHandle(pub u32);

impl UniformHandle {
    #[inline]
    #[must_use]
    pub const fn offset(self, index: u32) -> Self {
        Self(self.0 + index)
    }
}

impl fmt::Display for UniformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "location {}", self.0)
    }
}

// ─── ProgramBinary ────────────────────────────────────────────────────────────

/// A driver-specific serialized program plus its format tag.
///
/// Serializes with the blob base64-encoded so it can live in JSON caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramBinary {
    pub format: u32,
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    pub bytes: Vec<u8>,
}

impl ProgramBinary {
    #[must_use]
    pub fn new(format: u32, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }
}

fn encode_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    BASE64.decode(text).map_err(serde::de::Error::custom)
}

// ─── GraphicsDevice ───────────────────────────────────────────────────────────

/// Driver services consumed by the compiler, the uniform registry and
/// compiled variants.
///
/// Implementations use interior mutability: shading objects share one device
/// through `Arc<dyn GraphicsDevice>`.
pub trait GraphicsDevice: Send + Sync + fmt::Debug {
    /// Creates an empty stage object.
    fn create_stage(&self, stage: ShaderStage) -> StageHandle;

    /// Sets the stage source and compiles it. Returns the compile status.
    fn compile_stage(&self, stage: StageHandle, source: &str) -> bool;

    /// Compiler info log of the last compilation.
    fn stage_log(&self, stage: StageHandle) -> String;

    /// Deletes the stage, deferred while it is still attached to a program.
    fn delete_stage(&self, stage: StageHandle);

    fn create_program(&self) -> ProgramHandle;

    fn attach_stage(&self, program: ProgramHandle, stage: StageHandle);

    fn detach_stage(&self, program: ProgramHandle, stage: StageHandle);

    /// Links the attached stages. Returns the link status.
    fn link_program(&self, program: ProgramHandle) -> bool;

    /// Whether the program currently holds a successfully linked executable.
    fn link_status(&self, program: ProgramHandle) -> bool;

    /// Linker info log.
    fn program_log(&self, program: ProgramHandle) -> String;

    fn delete_program(&self, program: ProgramHandle);

    /// Replaces the program's executable with a binary. Returns the resulting
    /// link status; incompatible binaries leave the program unlinked.
    fn load_program_binary(&self, program: ProgramHandle, binary: &ProgramBinary) -> bool;

    /// Serializes a linked program, if the driver supports it.
    fn program_binary(&self, program: ProgramHandle) -> Option<ProgramBinary>;

    /// Location of an active uniform. `None` when the name is unknown to the
    /// linked program, including uniforms the compiler optimized out.
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformHandle>;

    /// Uploads one value to a uniform location.
    fn set_uniform(&self, program: ProgramHandle, location: UniformHandle, value: &UniformValue);

    /// Makes the program current for subsequent draws.
    fn use_program(&self, program: ProgramHandle);
}
