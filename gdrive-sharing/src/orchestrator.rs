use gdrive_core::{BatchItemResult, DriveError, ListRequest, RemoteObject, UserInfo, query};
use tracing::{error, info};

use crate::batch::{BatchAggregator, DEFAULT_BATCH_CAPACITY};
use crate::desired::DesiredState;
use crate::ownership::{OwnershipTransfer, TransferError, TransferOutcome};
use crate::pager;
use crate::permissions::{DEFAULT_PAGE_SIZE, PermissionReconciler};
use crate::remote::RemoteObjectService;
use crate::scope::{FolderSet, ScopeError, TreeScanner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub batch_capacity: usize,
    pub page_size: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub transferred: usize,
    pub failed: usize,
    pub planned_actions: usize,
    pub failed_batch_items: usize,
}

/// Owns everything a run needs: the service handle, the acting user, the
/// scanned scope and the desired state.
pub struct Orchestrator<'a, S> {
    service: &'a S,
    acting_user: UserInfo,
    scope: FolderSet,
    desired: DesiredState,
    settings: EngineSettings,
}

impl<'a, S: RemoteObjectService> Orchestrator<'a, S> {
    pub fn new(
        service: &'a S,
        acting_user: UserInfo,
        scope: FolderSet,
        desired: DesiredState,
        settings: EngineSettings,
    ) -> Self {
        Self {
            service,
            acting_user,
            scope,
            desired,
            settings,
        }
    }

    /// Identify the acting user and scan the tree below `root_name`.
    pub async fn bootstrap(
        service: &'a S,
        root_name: &str,
        desired: DesiredState,
        settings: EngineSettings,
    ) -> Result<Self, ScopeError> {
        let acting_user = service.current_user().await?;
        info!(user = %acting_user.email_address, "Signed in.");
        let scope = TreeScanner::new(service, settings.page_size)
            .scan(root_name)
            .await?;
        Ok(Self::new(service, acting_user, scope, desired, settings))
    }

    pub fn scope(&self) -> &FolderSet {
        &self.scope
    }

    pub fn acting_user(&self) -> &UserInfo {
        &self.acting_user
    }

    /// Files first, then folders deepest first. Per-object failures are
    /// logged and counted; only a failed listing ends the run.
    pub async fn run(&self) -> Result<RunSummary, DriveError> {
        let mut summary = RunSummary::default();
        self.file_pass(&mut summary).await?;
        self.folder_pass(&mut summary).await;
        info!(
            processed = summary.processed,
            transferred = summary.transferred,
            failed = summary.failed,
            actions = summary.planned_actions,
            failed_batch_items = summary.failed_batch_items,
            "Finished."
        );
        Ok(summary)
    }

    async fn file_pass(&self, summary: &mut RunSummary) -> Result<(), DriveError> {
        info!("Processing files...");
        let request = ListRequest::new(query::files_within(&self.scope.parent_filter()))
            .with_page_size(self.settings.page_size);
        // Transfers change parents, so the listing is read completely first.
        let files = pager::objects(self.service, request).try_collect().await?;

        let mut batch = BatchAggregator::new(self.service, self.settings.batch_capacity);
        for file in &files {
            self.process_and_record(file, &mut batch, summary).await;
        }
        self.finish_batch(&mut batch, summary).await;
        Ok(())
    }

    async fn folder_pass(&self, summary: &mut RunSummary) {
        info!("Processing folders...");
        let mut batch = BatchAggregator::new(self.service, self.settings.batch_capacity);
        for folder_id in self.scope.descendants() {
            match self.service.get_object(folder_id).await {
                Ok(folder) => self.process_and_record(&folder, &mut batch, summary).await,
                Err(err) => {
                    error!("Failed to read folder '{folder_id}': {err}");
                    summary.failed += 1;
                }
            }
        }
        self.finish_batch(&mut batch, summary).await;
    }

    async fn process_and_record<F>(
        &self,
        object: &RemoteObject,
        batch: &mut BatchAggregator<'_, S, F>,
        summary: &mut RunSummary,
    ) where
        F: FnMut(&BatchItemResult),
    {
        match self.process(object, batch).await {
            Ok((transferred, actions)) => {
                summary.processed += 1;
                summary.transferred += usize::from(transferred);
                summary.planned_actions += actions;
            }
            Err(err) => {
                error!("Failed to process '{}': {err}", object.name);
                summary.failed += 1;
            }
        }
    }

    async fn process<F>(
        &self,
        object: &RemoteObject,
        batch: &mut BatchAggregator<'_, S, F>,
    ) -> Result<(bool, usize), TransferError>
    where
        F: FnMut(&BatchItemResult),
    {
        let outcome = if self.desired.take_ownership {
            OwnershipTransfer::new(self.service, &self.acting_user, &self.scope)
                .dry_run(self.desired.dry_run)
                .with_batch_capacity(self.settings.batch_capacity)
                .with_page_size(self.settings.page_size)
                .transfer(object)
                .await?
        } else {
            TransferOutcome::AlreadyOwned(object.clone())
        };
        let transferred = matches!(outcome, TransferOutcome::Transferred(_));

        let actions = PermissionReconciler::new(self.service, &self.acting_user, &self.desired)
            .with_batch_capacity(self.settings.batch_capacity)
            .with_page_size(self.settings.page_size)
            .reconcile_into(outcome.current(object), None, batch)
            .await?;
        Ok((transferred, actions.len()))
    }

    async fn finish_batch<F>(&self, batch: &mut BatchAggregator<'_, S, F>, summary: &mut RunSummary)
    where
        F: FnMut(&BatchItemResult),
    {
        if let Err(err) = batch.flush().await {
            error!("Failed to send queued changes: {err}");
            summary.failed += 1;
        }
        summary.failed_batch_items += batch.failed_items();
    }
}
