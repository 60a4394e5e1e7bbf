//! Service wiring shared by the binary and embedding applications

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::StaticConfig;
use crate::services::{
    AttributionResolver, ClickTracker, CommissionEngine, FraudScorer, LogNotifier, PayoutLedger,
    ReferralService, ReputationProvider, RetentionTask,
};
use crate::storage::{SeaOrmStorage, StorageFactory};

pub struct StartupContext {
    pub storage: Arc<SeaOrmStorage>,
    pub scorer: Arc<FraudScorer>,
    pub commission: Arc<CommissionEngine>,
    pub click_tracker: Arc<ClickTracker>,
    pub attribution: Arc<AttributionResolver>,
    pub payouts: Arc<PayoutLedger>,
    pub referrals: Arc<ReferralService>,
    pub retention: Arc<RetentionTask>,
}

/// 连接数据库、执行迁移、加载风控规则并构建所有服务
pub async fn prepare_startup(config: &StaticConfig) -> Result<StartupContext> {
    let start_time = std::time::Instant::now();

    let storage = StorageFactory::create(&config.database)
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    let ctx = build_services(storage, config).await?;
    debug!("Startup completed in {:?}", start_time.elapsed());
    Ok(ctx)
}

/// 在已有存储上构建服务（测试和嵌入场景使用）
pub async fn build_services(
    storage: Arc<SeaOrmStorage>,
    config: &StaticConfig,
) -> Result<StartupContext> {
    let reputation = ReputationProvider::from_config(&config.fraud);
    debug!("IP reputation provider: {}", reputation.provider_name());

    let scorer = Arc::new(FraudScorer::new(storage.clone(), reputation.clone()));
    scorer
        .initialize()
        .await
        .context("Failed to load fraud rules")?;

    let commission = Arc::new(
        CommissionEngine::new(storage.clone(), &config.commission)
            .context("Invalid commission tier table")?,
    );
    let click_tracker = Arc::new(ClickTracker::new(
        storage.clone(),
        scorer.clone(),
        reputation,
        config.tracking.clone(),
    ));
    let attribution = Arc::new(AttributionResolver::new(
        storage.clone(),
        scorer.clone(),
        commission.clone(),
        config.payout.currency.clone(),
    ));
    let payouts = Arc::new(PayoutLedger::new(
        storage.clone(),
        Arc::new(LogNotifier),
        config.payout.currency.clone(),
    ));
    let referrals = Arc::new(ReferralService::new(
        storage.clone(),
        config.tracking.code_prefix.clone(),
    ));
    let retention = Arc::new(
        RetentionTask::new(storage.clone(), &config.tracking)
            .context("Invalid retention settings")?,
    );

    Ok(StartupContext {
        storage,
        scorer,
        commission,
        click_tracker,
        attribution,
        payouts,
        referrals,
        retention,
    })
}
