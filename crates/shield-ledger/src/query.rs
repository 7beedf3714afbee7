//! # Queries
//!
//! Read-only views over the ledger. Point lookups live on the keeper next to
//! their setters; this module adds filtered listings, pagination and the
//! ledger-wide status report.

use serde::{Deserialize, Serialize};

use shield_core::{Address, PoolId};

use crate::bank::BankKeeper;
use crate::context::Context;
use crate::error::TxResult;
use crate::keeper::{add_amount, Keeper};
use crate::staking::StakingKeeper;
use crate::types::{Collateral, Pool, ProposalReimbursement, Provider, Purchase, StatusReport};

/// Page selection for listings. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1000;

    pub fn new(page: usize, limit: usize) -> Self {
        Self { page, limit }
    }

    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit.min(Self::MAX_LIMIT)
        }
    }

    fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.effective_limit())
    }

    /// The requested page of `items`, plus the total count.
    pub fn paginate<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let items = items
            .into_iter()
            .skip(self.offset())
            .take(self.effective_limit())
            .collect();
        Page { items, total }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Pools protecting the named project.
    pub fn pools_by_sponsor(&self, ctx: &Context<'_>, sponsor: &str) -> TxResult<Vec<Pool>> {
        Ok(self
            .pools(ctx)?
            .into_iter()
            .filter(|p| p.sponsor == sponsor)
            .collect())
    }

    pub fn query_pools(&self, ctx: &Context<'_>, page: &PageRequest) -> TxResult<Page<Pool>> {
        Ok(page.paginate(self.pools(ctx)?))
    }

    pub fn query_providers(&self, ctx: &Context<'_>, page: &PageRequest) -> TxResult<Page<Provider>> {
        Ok(page.paginate(self.providers(ctx)?))
    }

    pub fn query_purchases(&self, ctx: &Context<'_>, page: &PageRequest) -> TxResult<Page<Purchase>> {
        Ok(page.paginate(self.purchases(ctx)?))
    }

    pub fn query_pool_purchases(
        &self,
        ctx: &Context<'_>,
        pool_id: PoolId,
        page: &PageRequest,
    ) -> TxResult<Page<Purchase>> {
        Ok(page.paginate(self.pool_purchases(ctx, pool_id)?))
    }

    pub fn query_purchaser_purchases(
        &self,
        ctx: &Context<'_>,
        purchaser: &Address,
        page: &PageRequest,
    ) -> TxResult<Page<Purchase>> {
        Ok(page.paginate(self.purchaser_purchases(ctx, purchaser)?))
    }

    pub fn query_pool_collaterals(
        &self,
        ctx: &Context<'_>,
        pool_id: PoolId,
        page: &PageRequest,
    ) -> TxResult<Page<Collateral>> {
        Ok(page.paginate(self.pool_collaterals(ctx, pool_id)?))
    }

    pub fn query_provider_collaterals(
        &self,
        ctx: &Context<'_>,
        provider: &Address,
        page: &PageRequest,
    ) -> TxResult<Page<Collateral>> {
        Ok(page.paginate(self.provider_collaterals(ctx, provider)?))
    }

    pub fn query_reimbursements(
        &self,
        ctx: &Context<'_>,
        page: &PageRequest,
    ) -> TxResult<Page<ProposalReimbursement>> {
        Ok(page.paginate(self.reimbursements(ctx)?))
    }

    /// Ledger-wide totals and fee pools.
    pub fn status(&self, ctx: &Context<'_>) -> TxResult<StatusReport> {
        let mut report = StatusReport::default();
        for pool in self.pools(ctx)? {
            report.total_collateral = add_amount(report.total_collateral, pool.total_collateral, "status: collateral")?;
            report.total_shield = add_amount(report.total_shield, pool.shield, "status: shield")?;
        }
        for provider in self.providers(ctx)? {
            report.total_locked = add_amount(report.total_locked, provider.total_locked, "status: locked")?;
            report.total_withdrawing = add_amount(report.total_withdrawing, provider.withdrawing, "status: withdrawing")?;
        }
        report.current_service_fees = self.service_fees(ctx)?;
        report.remaining_service_fees = self.remaining_service_fees(ctx)?;
        Ok(report)
    }
}
