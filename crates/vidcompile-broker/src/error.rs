use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("broker did not confirm delivery after {0} attempts")]
    DeliveryUnconfirmed(u32),
    #[error("store error: {0}")]
    Store(#[from] vidcompile_store::StoreError),
    #[error("unknown task id: {0}")]
    UnknownTask(String),
}
