use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("an execute cycle is already in flight")]
    CycleInFlight,
    #[error(transparent)]
    Request(#[from] dfn_types::RequestError),
}
