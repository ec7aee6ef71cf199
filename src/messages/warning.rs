//! The pointer warning catalog.

use core::fmt;

/// Identifies one of the recoverable conditions the engine can report.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum WarningCode {
    /// The last live pointer to a block went out of scope.
    LeakOutOfScope,
    /// The last live pointer to a block was overwritten.
    LeakOverwritten,
    /// The guard bytes around a block were found modified.
    MemoryBoundaryCorrupted,
}

impl WarningCode {
    /// Every warning code, in numeric order.
    pub const ALL: &'static [WarningCode] = &[
        WarningCode::LeakOutOfScope,
        WarningCode::LeakOverwritten,
        WarningCode::MemoryBoundaryCorrupted,
    ];

    /// Looks up a code by the engine's numeric value.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    const fn template(self) -> (&'static str, &'static str) {
        match self {
            WarningCode::LeakOutOfScope => (
                "Memory leak caused by last live pointer to memory block going out of scope",
                "",
            ),
            WarningCode::LeakOverwritten => (
                "Memory leak caused by last live pointer to memory block being overwritten",
                "",
            ),
            WarningCode::MemoryBoundaryCorrupted => (
                "Memory ",
                " allocated block was corrupted, likely due to invalid array indexing or pointer arithmetic",
            ),
        }
    }
}

/// Where a corrupted block was found damaged.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CorruptionLocation {
    /// No location was recorded.
    #[default]
    None,
    /// The guard bytes before the block were modified.
    Before,
    /// The guard bytes after the block were modified.
    After,
    /// Both guard regions were modified.
    BeforeAndAfter,
}

impl CorruptionLocation {
    /// Looks up a location by the engine's numeric value.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(CorruptionLocation::None),
            1 => Some(CorruptionLocation::Before),
            2 => Some(CorruptionLocation::After),
            3 => Some(CorruptionLocation::BeforeAndAfter),
            _ => None,
        }
    }

    /// The phrase substituted into the corruption warning.
    pub const fn phrase(self) -> &'static str {
        match self {
            CorruptionLocation::None => "",
            CorruptionLocation::Before => "before",
            CorruptionLocation::After => "after",
            CorruptionLocation::BeforeAndAfter => "before and after",
        }
    }
}

/// A pointer warning ready to be rendered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointerWarning {
    /// See [`WarningCode::LeakOutOfScope`].
    LeakOutOfScope,
    /// See [`WarningCode::LeakOverwritten`].
    LeakOverwritten,
    /// See [`WarningCode::MemoryBoundaryCorrupted`].
    MemoryBoundaryCorrupted(CorruptionLocation),
}

impl PointerWarning {
    /// The code this warning was raised with.
    pub const fn code(&self) -> WarningCode {
        match self {
            PointerWarning::LeakOutOfScope => WarningCode::LeakOutOfScope,
            PointerWarning::LeakOverwritten => WarningCode::LeakOverwritten,
            PointerWarning::MemoryBoundaryCorrupted(_) => WarningCode::MemoryBoundaryCorrupted,
        }
    }
}

impl fmt::Display for PointerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.code().template();
        f.write_str(head)?;
        if let PointerWarning::MemoryBoundaryCorrupted(location) = self {
            f.write_str(location.phrase())?;
        }
        f.write_str(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leak_warnings() {
        assert_eq!(
            PointerWarning::LeakOutOfScope.to_string(),
            "Memory leak caused by last live pointer to memory block going out of scope"
        );
        assert_eq!(
            PointerWarning::LeakOverwritten.to_string(),
            "Memory leak caused by last live pointer to memory block being overwritten"
        );
    }

    #[test]
    fn test_corruption_phrases() {
        let render = |location| PointerWarning::MemoryBoundaryCorrupted(location).to_string();
        assert_eq!(
            render(CorruptionLocation::BeforeAndAfter),
            "Memory before and after allocated block was corrupted, likely due to invalid array indexing or pointer arithmetic"
        );
        assert!(render(CorruptionLocation::After).starts_with("Memory after allocated block"));
        assert!(render(CorruptionLocation::None).starts_with("Memory  allocated block"));
    }

    #[test]
    fn test_numeric_lookup() {
        assert_eq!(
            WarningCode::from_index(2),
            Some(WarningCode::MemoryBoundaryCorrupted)
        );
        assert_eq!(WarningCode::from_index(3), None);
        assert_eq!(
            CorruptionLocation::from_index(1),
            Some(CorruptionLocation::Before)
        );
        assert_eq!(CorruptionLocation::from_index(4), None);
    }
}
