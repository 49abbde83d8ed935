//! Process wiring: one [`PointOfSale`] owns every component of the core.
//!
//! ```text
//! confirm_sale / void_sale
//!   → CommandDispatcher (logging → authorization → retry)
//!   → SaleCommandService (ledger batch + event append, one unit)
//!   → event bus ─┬→ "sales-projector" worker   → sales read model
//!                └→ "accounting" worker        → journal
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;

use kardex_auth::RolePermissions;
use kardex_events::{EventEnvelope, InMemoryEventBus};
use kardex_sales::SaleEvent;

use crate::accounting::{AccountingEngine, InMemoryJournal, MonthlyPeriods};
use crate::catalog::InMemoryCatalog;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::commands::{CONFIRM_SALE, ConfirmSale, SaleReceipt, SalesCommand, VOID_SALE, VoidSale};
use crate::config::PosConfig;
use crate::event_store::InMemoryEventStore;
use crate::handlers::{ConfirmSaleHandler, SaleCommandService, VoidSaleHandler};
use crate::ledger::InMemoryLedger;
use crate::middleware::{AuthorizationMiddleware, LoggingMiddleware, RetryMiddleware};
use crate::projections::SalesProjector;
use crate::read_model::InMemorySalesReadModel;
use crate::sale_repository::EventSourcedSaleRepository;
use crate::workers::{ProjectionWorker, WorkerHandle};

/// Path of a JSON role → permissions table, read by [`PointOfSale::bootstrap`].
pub const PERMISSIONS_FILE_ENV: &str = "KARDEX_PERMISSIONS_FILE";

pub type SaleBus = InMemoryEventBus<EventEnvelope<SaleEvent>>;
pub type Sales = EventSourcedSaleRepository<Arc<InMemoryEventStore>>;
pub type Projector =
    SalesProjector<Arc<InMemoryCatalog>, Arc<InMemorySalesReadModel>, Arc<InMemoryEventStore>>;
pub type Engine = AccountingEngine<Arc<InMemoryJournal>, MonthlyPeriods, Arc<Sales>>;
type Service = SaleCommandService<Arc<InMemoryCatalog>, Arc<InMemoryLedger>, Arc<Sales>, Arc<SaleBus>>;

/// Single-process point-of-sale core on in-memory storage.
pub struct PointOfSale {
    config: PosConfig,
    store: Arc<InMemoryEventStore>,
    bus: Arc<SaleBus>,
    ledger: Arc<InMemoryLedger>,
    catalog: Arc<InMemoryCatalog>,
    sales: Arc<Sales>,
    read_model: Arc<InMemorySalesReadModel>,
    projector: Arc<Projector>,
    journal: Arc<InMemoryJournal>,
    engine: Arc<Engine>,
    dispatcher: CommandDispatcher<SalesCommand, SaleReceipt>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl core::fmt::Debug for PointOfSale {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PointOfSale")
            .field("config", &self.config)
            .field("events", &self.store.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl PointOfSale {
    /// Wire every component. Workers are not running until
    /// [`start_workers`](Self::start_workers).
    pub fn in_memory(config: PosConfig, permissions: RolePermissions) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<SaleBus> = Arc::new(InMemoryEventBus::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let sales = Arc::new(EventSourcedSaleRepository::new(Arc::clone(&store)));
        let read_model = Arc::new(InMemorySalesReadModel::new());
        let projector = Arc::new(SalesProjector::new(
            Arc::clone(&catalog),
            Arc::clone(&read_model),
            Arc::clone(&store),
        ));
        let journal = Arc::new(InMemoryJournal::new());
        let engine = Arc::new(AccountingEngine::new(
            Arc::clone(&journal),
            MonthlyPeriods::every_month(),
            Arc::clone(&sales),
            config.accounts.clone(),
            config.default_period.clone(),
        ));

        let service: Arc<Service> = Arc::new(SaleCommandService::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&sales),
            Arc::clone(&bus),
        ));

        let mut dispatcher: CommandDispatcher<SalesCommand, SaleReceipt> = CommandDispatcher::new();
        dispatcher
            .register(
                CONFIRM_SALE,
                Arc::new(ConfirmSaleHandler::new(Arc::clone(&service))),
            )
            .register(VOID_SALE, Arc::new(VoidSaleHandler::new(service)))
            .use_middleware(Arc::new(LoggingMiddleware))
            .use_middleware(Arc::new(AuthorizationMiddleware::new(Arc::new(permissions))))
            .use_middleware(Arc::new(RetryMiddleware::new(config.max_retries)));

        Self {
            config,
            store,
            bus,
            ledger,
            catalog,
            sales,
            read_model,
            projector,
            journal,
            engine,
            dispatcher,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Process entry point: configuration from the environment, permissions
    /// from [`PERMISSIONS_FILE_ENV`] (or the standard table), workers running.
    pub fn bootstrap() -> anyhow::Result<Self> {
        let config = PosConfig::from_env();
        let permissions = match std::env::var(PERMISSIONS_FILE_ENV) {
            Ok(path) => load_permissions(Path::new(&path))?,
            Err(_) => RolePermissions::standard(),
        };

        let pos = Self::in_memory(config, permissions);
        pos.start_workers().context("starting event bus workers")?;
        tracing::info!(config = ?pos.config, "point of sale ready");
        Ok(pos)
    }

    /// Subscribe the projector and the accounting engine to the bus.
    ///
    /// Calling it again while workers are running is a no-op.
    pub fn start_workers(&self) -> std::io::Result<()> {
        let mut workers = self
            .workers
            .lock()
            .map_err(|_| std::io::Error::other("worker registry poisoned"))?;
        if !workers.is_empty() {
            return Ok(());
        }

        let projector = Arc::clone(&self.projector);
        workers.push(ProjectionWorker::spawn(
            "sales-projector",
            &self.bus,
            move |envelope: EventEnvelope<SaleEvent>| projector.apply_envelope(&envelope),
        )?);

        let engine = Arc::clone(&self.engine);
        workers.push(ProjectionWorker::spawn(
            "accounting",
            &self.bus,
            move |envelope: EventEnvelope<SaleEvent>| engine.handle(&envelope).map(|_| ()),
        )?);

        tracing::debug!(workers = workers.len(), "event bus workers started");
        Ok(())
    }

    /// Stop and join every worker. Events published afterwards are only
    /// picked up by a rebuild.
    pub fn shutdown(&self) {
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            let name = handle.name();
            handle.shutdown();
            tracing::debug!(worker = name, "worker stopped");
        }
    }

    pub async fn execute(&self, command: SalesCommand) -> Result<SaleReceipt, DispatchError> {
        self.dispatcher
            .execute_with_timeout(command, self.config.command_timeout)
            .await
    }

    pub async fn confirm_sale(&self, command: ConfirmSale) -> Result<SaleReceipt, DispatchError> {
        self.execute(command.into()).await
    }

    pub async fn void_sale(&self, command: VoidSale) -> Result<SaleReceipt, DispatchError> {
        self.execute(command.into()).await
    }

    pub fn config(&self) -> &PosConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<InMemoryEventStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<SaleBus> {
        &self.bus
    }

    pub fn ledger(&self) -> &Arc<InMemoryLedger> {
        &self.ledger
    }

    pub fn catalog(&self) -> &Arc<InMemoryCatalog> {
        &self.catalog
    }

    pub fn sales(&self) -> &Arc<Sales> {
        &self.sales
    }

    pub fn read_model(&self) -> &Arc<InMemorySalesReadModel> {
        &self.read_model
    }

    pub fn projector(&self) -> &Arc<Projector> {
        &self.projector
    }

    pub fn journal(&self) -> &Arc<InMemoryJournal> {
        &self.journal
    }

    pub fn accounting(&self) -> &Arc<Engine> {
        &self.engine
    }
}

impl Drop for PointOfSale {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read a JSON role → permissions table, e.g. `{"cashier": ["sales.confirm"]}`.
pub fn load_permissions(path: &Path) -> anyhow::Result<RolePermissions> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading role permissions from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing role permissions in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kardex_auth::{Permission, Role};
    use kardex_core::{AggregateId, UserId};
    use kardex_events::{EventBus, EventMetadata};
    use kardex_sales::{SALE_AGGREGATE_TYPE, SALE_VOIDED, SaleId, SaleVoided};
    use uuid::Uuid;

    use super::*;

    fn stray_void() -> EventEnvelope<SaleEvent> {
        let sale_id = SaleId::new(AggregateId::new());
        EventEnvelope::new(
            Uuid::now_v7(),
            sale_id.0,
            SALE_AGGREGATE_TYPE,
            SALE_VOIDED,
            1,
            1,
            EventMetadata::new(UserId::new(), Uuid::now_v7()),
            Utc::now(),
            SaleEvent::SaleVoided(SaleVoided {
                sale_id,
                reason: "late".into(),
                voided_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn permissions_file_is_parsed() {
        let path = std::env::temp_dir().join(format!("kardex-perms-{}.json", Uuid::now_v7()));
        std::fs::write(&path, r#"{"cashier": ["sales.confirm"], "manager": ["*"]}"#).unwrap();

        let table = load_permissions(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(table.has_permission(&Role::CASHIER, &Permission::SALES_CONFIRM));
        assert!(!table.has_permission(&Role::CASHIER, &Permission::SALES_VOID));
        assert!(table.has_permission(&Role::new("manager"), &Permission::SALES_VOID));
    }

    #[test]
    fn missing_permissions_file_names_the_path() {
        let err = load_permissions(Path::new("/nonexistent/kardex-perms.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/kardex-perms.json"));
    }

    #[test]
    fn workers_start_once_and_stop_cleanly() {
        let pos = PointOfSale::in_memory(PosConfig::default(), RolePermissions::standard());
        pos.start_workers().unwrap();
        pos.start_workers().unwrap();
        assert_eq!(pos.bus().subscriber_count(), 2);

        pos.shutdown();
        // Dropped subscriptions are pruned on the next publish.
        pos.bus().publish(stray_void()).unwrap();
        assert_eq!(pos.bus().subscriber_count(), 0);
    }
}
