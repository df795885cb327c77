//! Reader configuration.
//!
//! `DwarfConfig` carries what the decoder needs to know about the container
//! file without depending on any particular object-file format.

/// How to treat a `DW_AT_sibling` value that cannot be a real next sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SiblingPolicy {
    /// Fail with `InvalidDieOffset`.
    #[default]
    Strict,
    /// Log a warning and find the sibling by walking the subtree instead.
    Lenient,
}

/// Configuration for a [`DebugInfo`](crate::dwarf::DebugInfo) context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DwarfConfig {
    /// Byte order of every section.
    pub little_endian: bool,
    /// Machine architecture name, e.g. `"x64"` or `"ARM"`.
    pub machine_arch: String,
    /// Pointer size of the container file, in bytes.
    pub default_address_size: u8,
    /// Handling of malformed sibling pointers.
    pub sibling_policy: SiblingPolicy,
}

impl Default for DwarfConfig {
    fn default() -> Self {
        Self {
            little_endian: true,
            machine_arch: "x64".to_string(),
            default_address_size: 8,
            sibling_policy: SiblingPolicy::Strict,
        }
    }
}

impl DwarfConfig {
    pub fn with_little_endian(mut self, little_endian: bool) -> Self {
        self.little_endian = little_endian;
        self
    }

    pub fn with_machine_arch(mut self, arch: impl Into<String>) -> Self {
        self.machine_arch = arch.into();
        self
    }

    pub fn with_default_address_size(mut self, size: u8) -> Self {
        self.default_address_size = size;
        self
    }

    pub fn with_sibling_policy(mut self, policy: SiblingPolicy) -> Self {
        self.sibling_policy = policy;
        self
    }
}
