use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseValueError {
    #[error("invalid filter value '{0}', expected all, true or false")]
    TriState(String),
    #[error("invalid sort direction '{0}', expected newest or oldest")]
    SortDirection(String),
    #[error("invalid filter expression '{0}', expected name=value")]
    FilterExpression(String),
}
