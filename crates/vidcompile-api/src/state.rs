use std::sync::Arc;

use vidcompile_broker::{Dispatcher, RedisBroker};
use vidcompile_config::Config;
use vidcompile_media::path::PathTables;
use vidcompile_media::probe::ProbePool;
use vidcompile_store::{JobStore, WarehouseGateway};

use crate::verification::VerificationService;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub warehouse: Arc<WarehouseGateway>,
    pub broker: Arc<RedisBroker>,
    pub dispatcher: Arc<Dispatcher<RedisBroker>>,
    pub path_tables: Arc<PathTables>,
    pub probe_pool: Arc<ProbePool>,
    pub verification: Arc<VerificationService>,
    pub config: Arc<Config>,
}
