/// Error codes for Grebe diagnostics.
/// E01xx = parse errors
/// E02xx = type errors
/// E03xx = evaluation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Parse errors
    E0100, // unexpected character
    E0101, // unexpected token

    // Type errors
    E0200, // type mismatch
    E0201, // unbound name
    E0202, // missing required argument
    E0203, // infinite type
    E0204, // conflicting redefinition
    E0205, // non-monotype where a concrete type was required
    E0206, // circular dependency
    E0207, // interface conformance

    // Evaluation errors
    E0300, // unsupported operation
    E0301, // assertion failed
    E0302, // required slot without a value
    E0303, // cancelled
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E0100 => "E0100",
            ErrorCode::E0101 => "E0101",
            ErrorCode::E0200 => "E0200",
            ErrorCode::E0201 => "E0201",
            ErrorCode::E0202 => "E0202",
            ErrorCode::E0203 => "E0203",
            ErrorCode::E0204 => "E0204",
            ErrorCode::E0205 => "E0205",
            ErrorCode::E0206 => "E0206",
            ErrorCode::E0207 => "E0207",
            ErrorCode::E0300 => "E0300",
            ErrorCode::E0301 => "E0301",
            ErrorCode::E0302 => "E0302",
            ErrorCode::E0303 => "E0303",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::E0100 | ErrorCode::E0101 => "parse",
            ErrorCode::E0200
            | ErrorCode::E0201
            | ErrorCode::E0202
            | ErrorCode::E0203
            | ErrorCode::E0204
            | ErrorCode::E0205
            | ErrorCode::E0206
            | ErrorCode::E0207 => "type",
            ErrorCode::E0300 | ErrorCode::E0301 | ErrorCode::E0302 | ErrorCode::E0303 => "eval",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::E0100 => "unexpected character",
            ErrorCode::E0101 => "unexpected token",
            ErrorCode::E0200 => "type mismatch",
            ErrorCode::E0201 => "unbound name",
            ErrorCode::E0202 => "missing required argument",
            ErrorCode::E0203 => "infinite type",
            ErrorCode::E0204 => "conflicting redefinition",
            ErrorCode::E0205 => "not a concrete type",
            ErrorCode::E0206 => "circular dependency",
            ErrorCode::E0207 => "interface conformance",
            ErrorCode::E0300 => "unsupported operation",
            ErrorCode::E0301 => "assertion failed",
            ErrorCode::E0302 => "required slot without a value",
            ErrorCode::E0303 => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
