//! Read-only views the engine hands to a listener.
//!
//! None of these types own engine state. An [`AllocationInfo`] borrows the
//! engine's bookkeeping for the duration of a single callback, and a
//! [`UsageStats`] is a plain snapshot of the engine's counters.

use core::fmt;

/// A raw code or data address, as recorded by the engine.
///
/// Formats as `0x` followed by lowercase hex digits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub usize);

impl Address {
    /// The null address. Terminates a backtrace.
    pub const NULL: Self = Self(0);

    /// Returns true for the null address.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

/// Returns the addresses of a backtrace, stopping at the first null entry.
pub(crate) fn frames(backtrace: &[Address]) -> impl Iterator<Item = Address> + '_ {
    backtrace.iter().copied().take_while(|address| !address.is_null())
}

/// An opaque tag a listener attaches to an allocation when it is created.
///
/// The engine stores the tag and hands it back in [`AllocationInfo::user_info`]
/// when the allocation is later reported as a leak.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct UserTag(pub usize);

impl UserTag {
    /// The tag of an allocation nobody tagged.
    pub const NONE: Self = Self(0);

    /// Set on allocations whose leaks must not be reported.
    pub const SUPPRESS_BIT: usize = 0x8000_0000;

    /// Returns true if the suppression bit is set.
    pub const fn is_suppressed(self) -> bool {
        self.0 & Self::SUPPRESS_BIT != 0
    }

    /// Returns this tag with the suppression bit set.
    pub const fn suppressed(self) -> Self {
        Self(self.0 | Self::SUPPRESS_BIT)
    }
}

/// Describes one tracked allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocationInfo<'a> {
    /// Address of the first byte of the block.
    pub address: Address,
    /// Size of the block in bytes.
    pub block_size: usize,
    /// Name of the allocated type, if the engine knows it.
    pub type_name: Option<&'a str>,
    /// Whether the block was allocated with `new[]`.
    pub is_array: bool,
    /// Number of elements for array allocations, zero when unknown.
    pub array_size: usize,
    /// Return addresses captured when the block was allocated.
    ///
    /// A null entry terminates the sequence early.
    pub backtrace: Option<&'a [Address]>,
    /// The tag attached to this allocation when it was created.
    pub user_info: UserTag,
}

impl<'a> AllocationInfo<'a> {
    /// Creates the description of an untyped scalar allocation.
    pub const fn new(address: Address, block_size: usize) -> Self {
        Self {
            address,
            block_size,
            type_name: None,
            is_array: false,
            array_size: 0,
            backtrace: None,
            user_info: UserTag::NONE,
        }
    }

    /// Sets the allocated type name.
    pub const fn with_type_name(mut self, type_name: &'a str) -> Self {
        self.type_name = Some(type_name);
        self
    }

    /// Marks the allocation as an array of `array_size` elements.
    pub const fn with_array_size(mut self, array_size: usize) -> Self {
        self.is_array = true;
        self.array_size = array_size;
        self
    }

    /// Sets the allocation-time backtrace.
    pub const fn with_backtrace(mut self, backtrace: &'a [Address]) -> Self {
        self.backtrace = Some(backtrace);
        self
    }

    /// Sets the tag attached to the allocation.
    pub const fn with_user_info(mut self, user_info: UserTag) -> Self {
        self.user_info = user_info;
        self
    }
}

/// The engine's counters at the end of a run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageStats {
    /// Number of leaked allocations.
    pub leaks: usize,
    /// Sum of the sizes of every allocation made.
    pub total_bytes_allocated: usize,
    /// High-water mark of live bytes.
    pub maximum_bytes_in_use: usize,
    /// Calls to scalar `new`.
    pub calls_to_new: usize,
    /// Calls to scalar `delete` with a non-null pointer.
    pub calls_to_delete: usize,
    /// Calls to `new[]`.
    pub calls_to_array_new: usize,
    /// Calls to `delete[]` with a non-null pointer.
    pub calls_to_array_delete: usize,
    /// Calls to scalar `delete` with a null pointer.
    pub calls_to_delete_null: usize,
    /// Calls to `delete[]` with a null pointer.
    pub calls_to_array_delete_null: usize,
}

impl UsageStats {
    /// Null deletes of either kind.
    pub const fn calls_to_any_delete_null(&self) -> usize {
        self.calls_to_delete_null + self.calls_to_array_delete_null
    }
}
