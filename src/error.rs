//! Error types for the truss topology optimizer

use thiserror::Error;

/// Errors raised while assembling or solving the linear system for a structure.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SolveError {
    #[error("zero-length spring between node {i} and node {j}")]
    ZeroLengthSpring { i: u32, j: u32 },

    #[error("singular stiffness matrix: structure is kinematically unstable")]
    Singular,

    #[error("non-finite value in displacement solution")]
    NonFinite,
}

/// Errors raised by the optimization driver.
///
/// Distinct from [`SolveError`]: a solver failure inside one iteration is a
/// rollback signal, not necessarily a driver error. These variants are the
/// ones surfaced to the caller as termination reasons.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopoError {
    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error("protected nodes are disconnected: {unreachable:?} unreachable from anchor")]
    DisconnectedProtected { unreachable: Vec<u32> },

    #[error("no removable (non-protected) candidates remain")]
    NoRemovableCandidates,

    #[error("stagnation escape exhausted without an accepted removal")]
    Stuck,

    #[error("maximum step count ({0}) reached before target mass")]
    MaxStepsExceeded(u64),

    #[error("optimization cancelled by caller")]
    Cancelled,
}

/// Result type for fallible structural operations (kernel, assembler, solver).
pub type SolveResult<T> = Result<T, SolveError>;

/// Result type for driver-level operations.
pub type TopoResult<T> = Result<T, TopoError>;
