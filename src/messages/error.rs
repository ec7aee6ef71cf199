//! The pointer error catalog.
//!
//! Every [`ErrorCode`] maps to exactly one template. Templates are stored as
//! a sequence of [`Segment`]s so the number and kind of arguments a code
//! expects is part of the table itself, and a [`PointerError`] can only be
//! built from arguments that fill its template completely.

use core::fmt;

/// The kind of value a template placeholder accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// A signed integer, such as an array index that may be negative.
    Signed,
    /// An unsigned integer, such as a size or a maximum index.
    Unsigned,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Signed => f.write_str("a signed integer"),
            ArgKind::Unsigned => f.write_str("an unsigned integer"),
        }
    }
}

/// One piece of a message template.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Literal text copied into the rendered message.
    Text(&'static str),
    /// A slot filled by the next argument, which must be of the given kind.
    Placeholder(ArgKind),
}

/// A single argument supplied by the engine for a placeholder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatArg {
    /// A signed integer argument.
    Signed(i64),
    /// An unsigned integer argument.
    Unsigned(u64),
}

impl FormatArg {
    /// Returns the kind of placeholder this argument can fill.
    pub const fn kind(&self) -> ArgKind {
        match self {
            FormatArg::Signed(_) => ArgKind::Signed,
            FormatArg::Unsigned(_) => ArgKind::Unsigned,
        }
    }
}

impl fmt::Display for FormatArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatArg::Signed(value) => write!(f, "{value}"),
            FormatArg::Unsigned(value) => write!(f, "{value}"),
        }
    }
}

impl From<i32> for FormatArg {
    fn from(value: i32) -> Self {
        FormatArg::Signed(value.into())
    }
}

impl From<i64> for FormatArg {
    fn from(value: i64) -> Self {
        FormatArg::Signed(value)
    }
}

impl From<isize> for FormatArg {
    fn from(value: isize) -> Self {
        FormatArg::Signed(value as i64)
    }
}

impl From<u32> for FormatArg {
    fn from(value: u32) -> Self {
        FormatArg::Unsigned(value.into())
    }
}

impl From<u64> for FormatArg {
    fn from(value: u64) -> Self {
        FormatArg::Unsigned(value)
    }
}

impl From<usize> for FormatArg {
    fn from(value: usize) -> Self {
        FormatArg::Unsigned(value as u64)
    }
}

/// Raised when an argument pack does not match the template of its code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentMismatch {
    /// The wrong number of arguments was supplied.
    #[error("{code:?} expects {expected} argument(s) but {actual} were supplied")]
    Count {
        /// The code whose template was being filled.
        code: ErrorCode,
        /// Number of placeholders in the template.
        expected: usize,
        /// Number of arguments supplied.
        actual: usize,
    },
    /// An argument of the wrong kind was supplied for a placeholder.
    #[error("argument {position} of {code:?} must be {expected}, not {actual}")]
    Kind {
        /// The code whose template was being filled.
        code: ErrorCode,
        /// Zero-based position of the offending argument.
        position: usize,
        /// The kind the placeholder accepts.
        expected: ArgKind,
        /// The kind that was supplied.
        actual: ArgKind,
    },
}

macro_rules! error_codes {
    ($($(#[$meta:meta])* $name:ident => [$($segment:expr),+ $(,)?]),+ $(,)?) => {
        /// Identifies one of the pointer misuse conditions the engine can detect.
        ///
        /// The discriminants are the engine's numeric codes.
        #[allow(missing_docs)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum ErrorCode {
            $($(#[$meta])* $name,)+
        }

        impl ErrorCode {
            /// Every error code, in numeric order.
            pub const ALL: &'static [ErrorCode] = &[$(ErrorCode::$name,)+];

            /// Returns the template this code renders with.
            pub const fn template(self) -> &'static [Segment] {
                match self {
                    $(ErrorCode::$name => &[$($segment),+],)+
                }
            }
        }
    };
}

use self::{ArgKind::*, Segment::*};

error_codes! {
    /// A checked pointer was made to point at memory not obtained from `new`.
    InvalidOrigin => [Text("Checked pointers cannot point to memory that wasn't allocated with new or new[]")],
    AssignDeadUninitialized => [Text("Assigned dead (never initialized) pointer to another pointer")],
    AssignDeadDeleted => [Text("Assigned dead (already deleted) pointer to another pointer")],
    AssignDeadOutOfBounds => [Text("Assigned dead (out of bounds) pointer to another pointer")],
    ScalarDeleteOnArray => [Text("Called delete instead of delete[] on array pointer")],
    ArrayDeleteOnScalar => [Text("Called delete[] instead of delete on non-array pointer")],
    DeleteDeadUninitialized => [Text("Called delete on (never initialized) dead pointer")],
    ArrayDeleteDeadUninitialized => [Text("Called delete[] on (never initialized) dead pointer")],
    DeleteDeadDeleted => [Text("Called delete on (already deleted or not dynamically allocated) dead pointer")],
    ArrayDeleteDeadDeleted => [Text("Called delete[] on (already deleted or not dynamically allocated) dead pointer")],
    ArrowDeadUninitialized => [Text("Dereferenced (never initialized) dead pointer using operator->")],
    StarDeadUninitialized => [Text("Dereferenced (never initialized) dead pointer using operator*")],
    IndexDeadUninitialized => [Text("Dereferenced (never initialized) dead pointer using operator[]")],
    ArrowDeadDeleted => [Text("Dereferenced (already deleted) dead pointer using operator->")],
    StarDeadDeleted => [Text("Dereferenced (already deleted) dead pointer using operator*")],
    IndexDeadDeleted => [Text("Dereferenced (already deleted) dead pointer using operator[]")],
    ArrowDeadOutOfBounds => [Text("Dereferenced (out of bounds) dead pointer using operator->")],
    StarDeadOutOfBounds => [Text("Dereferenced (out of bounds) dead pointer using operator*")],
    IndexDeadOutOfBounds => [Text("Dereferenced (out of bounds) dead pointer using operator[]")],
    ArrowNull => [Text("Dereferenced null pointer using operator->")],
    StarNull => [Text("Dereferenced null pointer using operator*")],
    IndexNull => [Text("Dereferenced null pointer using operator[]")],
    UseDeadUninitialized => [Text("Used (never initialized) dead pointer in an expression")],
    UseDeadDeleted => [Text("Used (already deleted) dead pointer in an expression")],
    UseDeadOutOfBounds => [Text("Used (out of bounds) dead pointer in an expression")],
    CompareDeadUninitialized => [Text("Used (never initialized) dead pointer in a comparison")],
    CompareDeadDeleted => [Text("Used (already deleted) dead pointer in a comparison")],
    CompareDeadOutOfBounds => [Text("Used (out of bounds) dead pointer in a comparison")],
    CompareNullWithLive => [Text("Used null pointer on only one side of an inequality comparison; if one side is null then the both sides must be null")],
    CompareUnrelatedBlocks => [Text("Both pointers being compared are alive but point into different memory blocks, so the comparison is undefined")],
    ArithmeticDeadUninitialized => [Text("Used (never initialized) dead pointer in an arithmetic expression")],
    ArithmeticDeadDeleted => [Text("Used (already deleted) dead pointer in an arithmetic expression")],
    ArithmeticDeadOutOfBounds => [Text("Used (out of bounds) dead pointer in an arithmetic expression")],
    ArithmeticNull => [Text("Used null pointer in an arithmetic expression")],
    SubtractNullWithLive => [Text("Used null pointer on only one side of a pointer subtraction expression; if one side is null then both sides must be null")],
    SubtractUnrelatedBlocks => [Text("Both pointers being subtracted are alive but point into different memory blocks, so the distance between them is undefined")],
    ArithmeticMovedOutOfBounds => [Text("Pointer arithmetic has moved a live pointer out of bounds")],
    IndexOnNonArray => [Text("Used operator[] on a pointer that does not point to an array")],
    /// Takes the offending index and the largest valid index.
    ArrayIndexOutOfBounds => [
        Text("Array index "),
        Placeholder(Signed),
        Text(" is out of bounds; valid indices are in the range [0.."),
        Placeholder(Unsigned),
        Text("]"),
    ],
    PreviouslyInvalidated => [Text("A previous operation has made this pointer invalid")],
}

impl ErrorCode {
    /// Looks up a code by the engine's numeric value.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The engine's numeric value for this code.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The kinds of the placeholders in this code's template, in order.
    pub fn placeholders(self) -> impl Iterator<Item = ArgKind> {
        self.template().iter().filter_map(|segment| match segment {
            Placeholder(kind) => Some(*kind),
            Text(_) => None,
        })
    }

    fn check(self, args: &[FormatArg]) -> Result<(), ArgumentMismatch> {
        let expected = self.placeholders().count();
        if expected != args.len() {
            return Err(ArgumentMismatch::Count {
                code: self,
                expected,
                actual: args.len(),
            });
        }
        for (position, (expected, arg)) in self.placeholders().zip(args).enumerate() {
            if expected != arg.kind() {
                return Err(ArgumentMismatch::Kind {
                    code: self,
                    position,
                    expected,
                    actual: arg.kind(),
                });
            }
        }
        Ok(())
    }
}

/// A pointer error together with the arguments its message needs.
///
/// Construction checks the arguments against the code's template, so
/// formatting a `PointerError` always produces a complete message.
///
/// ```
/// use dereferee::messages::{ErrorCode, PointerError};
///
/// let error = PointerError::array_index_out_of_bounds(12, 9);
/// assert_eq!(error.code(), ErrorCode::ArrayIndexOutOfBounds);
/// assert_eq!(
///     error.to_string(),
///     "Array index 12 is out of bounds; valid indices are in the range [0..9]"
/// );
///
/// assert!(PointerError::new(ErrorCode::ArrayIndexOutOfBounds).is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerError {
    code: ErrorCode,
    args: Vec<FormatArg>,
}

impl PointerError {
    /// Creates an error for a code whose template takes no arguments.
    pub fn new(code: ErrorCode) -> Result<Self, ArgumentMismatch> {
        Self::from_code(code, &[])
    }

    /// Creates an error from a code and an untyped argument pack.
    pub fn from_code(code: ErrorCode, args: &[FormatArg]) -> Result<Self, ArgumentMismatch> {
        code.check(args)?;
        Ok(Self {
            code,
            args: args.to_vec(),
        })
    }

    /// Creates the array-bounds error for `index` against `max_index`.
    pub fn array_index_out_of_bounds(index: isize, max_index: usize) -> Self {
        Self {
            code: ErrorCode::ArrayIndexOutOfBounds,
            args: vec![index.into(), max_index.into()],
        }
    }

    /// The code this error was raised with.
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// The arguments filling the code's placeholders.
    pub fn args(&self) -> &[FormatArg] {
        &self.args
    }
}

impl TryFrom<ErrorCode> for PointerError {
    type Error = ArgumentMismatch;

    fn try_from(code: ErrorCode) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl fmt::Display for PointerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut args = self.args.iter();
        for segment in self.code.template() {
            match segment {
                Text(text) => f.write_str(text)?,
                Placeholder(_) => match args.next() {
                    Some(arg) => write!(f, "{arg}")?,
                    None => return Err(fmt::Error),
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(ArgumentMismatch: Copy, Send, Sync, std::error::Error);

    #[test]
    fn test_codes_are_numbered_in_catalog_order() {
        assert_eq!(ErrorCode::ALL.len(), 40);
        for (index, code) in ErrorCode::ALL.iter().enumerate() {
            assert_eq!(code.index(), index);
            assert_eq!(ErrorCode::from_index(index), Some(*code));
        }
        assert_eq!(ErrorCode::from_index(40), None);
        assert_eq!(ErrorCode::ArrayIndexOutOfBounds.index(), 38);
    }

    #[test]
    fn test_every_code_renders_without_leftover_placeholders() {
        for &code in ErrorCode::ALL {
            let args: Vec<FormatArg> = code
                .placeholders()
                .map(|kind| match kind {
                    ArgKind::Signed => FormatArg::Signed(-3),
                    ArgKind::Unsigned => FormatArg::Unsigned(7),
                })
                .collect();
            let rendered = PointerError::from_code(code, &args)
                .expect("arguments built from the template")
                .to_string();
            assert!(!rendered.is_empty());
            assert!(!rendered.contains('%'), "{code:?}: {rendered}");
            assert!(!rendered.contains("{}"), "{code:?}: {rendered}");
        }
    }

    #[test]
    fn test_only_array_bounds_takes_arguments() {
        for &code in ErrorCode::ALL {
            let arity = code.placeholders().count();
            if code == ErrorCode::ArrayIndexOutOfBounds {
                assert_eq!(arity, 2);
            } else {
                assert_eq!(arity, 0, "{code:?}");
            }
        }
    }

    #[test]
    fn test_negative_index_is_rendered_signed() {
        let error = PointerError::array_index_out_of_bounds(-1, 4);
        assert_eq!(
            error.to_string(),
            "Array index -1 is out of bounds; valid indices are in the range [0..4]"
        );
    }

    #[test]
    fn test_argument_count_mismatch_is_rejected() {
        assert_eq!(
            PointerError::new(ErrorCode::ArrayIndexOutOfBounds),
            Err(ArgumentMismatch::Count {
                code: ErrorCode::ArrayIndexOutOfBounds,
                expected: 2,
                actual: 0,
            })
        );
        assert!(PointerError::from_code(ErrorCode::StarNull, &[FormatArg::Signed(1)]).is_err());
    }

    #[test]
    fn test_argument_kind_mismatch_is_rejected() {
        let err = PointerError::from_code(
            ErrorCode::ArrayIndexOutOfBounds,
            &[FormatArg::Signed(3), FormatArg::Signed(2)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ArgumentMismatch::Kind {
                code: ErrorCode::ArrayIndexOutOfBounds,
                position: 1,
                expected: ArgKind::Unsigned,
                actual: ArgKind::Signed,
            }
        );
        assert_eq!(
            err.to_string(),
            "argument 1 of ArrayIndexOutOfBounds must be an unsigned integer, not a signed integer"
        );
    }

    #[test]
    fn test_try_from_code() {
        let error = PointerError::try_from(ErrorCode::StarNull).unwrap();
        assert_eq!(error.to_string(), "Dereferenced null pointer using operator*");
        assert!(error.args().is_empty());
    }
}
