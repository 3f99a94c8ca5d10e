use thiserror::Error;

/// Errors surfaced by the actor runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActorError {
    /// A request future expired before a result arrived.
    #[error("request timed out")]
    Timeout,

    /// The target process was dead; a `DeadLetterResponse` came back instead
    /// of a result.
    #[error("dead letter response")]
    DeadLetter,

    /// `spawn_named` found the id already bound in the registry.
    #[error("a process with the id {0:?} already exists")]
    NameExists(String),
}
