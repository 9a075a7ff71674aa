//! In-memory order repository for callers' tests.
//!
//! Mirrors the SQLite store's observable contract: sequential ids from 1,
//! raw (unaggregated) orders on read, unknown ids omitted, results in
//! ascending id order.

use crate::context::OpContext;
use crate::model::order::{Order, OrderId, OrderStatus};
use crate::repo::order_repo::{OrderRepoResult, OrderRepository, OrderSet};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

struct MemoryState {
    orders: BTreeMap<OrderId, Order>,
    next_id: OrderId,
}

pub struct InMemoryOrderRepository {
    state: Mutex<MemoryState>,
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                orders: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn save(&self, ctx: &OpContext, order: &mut Order) -> OrderRepoResult<OrderId> {
        ctx.check()?;
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        order.assign_id(id);
        if order.status == OrderStatus::Unknown {
            order.status = OrderStatus::Created;
        }

        let mut stored = order.clone();
        stored.original_amount = 0;
        stored.discounted_amount = 0;
        state.orders.insert(id, stored);
        Ok(id)
    }

    fn get(&self, ctx: &OpContext, ids: &[OrderId]) -> OrderRepoResult<OrderSet> {
        ctx.check()?;
        let wanted: BTreeSet<OrderId> = ids.iter().copied().collect();
        let state = self.state.lock();

        let mut result = OrderSet::with_capacity(wanted.len());
        for id in wanted {
            if let Some(order) = state.orders.get(&id) {
                result.insert(order.clone());
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryOrderRepository;
    use crate::context::OpContext;
    use crate::model::order::{Item, Order, PaymentType};
    use crate::repo::order_repo::{OrderRepoError, OrderRepository};

    #[test]
    fn save_assigns_sequential_ids_and_stamps_items() {
        let repo = InMemoryOrderRepository::new();
        let ctx = OpContext::background();
        let mut first = Order::new(1, PaymentType::Card, vec![Item::new(3, 1, 0)]);
        let mut second = Order::new(2, PaymentType::Wallet, Vec::new());

        assert_eq!(repo.save(&ctx, &mut first).unwrap(), 1);
        assert_eq!(repo.save(&ctx, &mut second).unwrap(), 2);
        assert_eq!(first.items[0].order_id, 1);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn get_omits_unknown_ids_and_does_not_aggregate() {
        let repo = InMemoryOrderRepository::new();
        let ctx = OpContext::background();
        let mut order = Order::new(1, PaymentType::Card, vec![Item::new(3, 10, 1)]);
        order.recompute_totals();
        let id = repo.save(&ctx, &mut order).unwrap();

        let found = repo.get(&ctx, &[id, 99, id]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(id).unwrap().original_amount, 0);
    }

    #[test]
    fn cancelled_context_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let ctx = OpContext::background();
        ctx.cancel();
        let mut order = Order::new(1, PaymentType::Card, Vec::new());
        let err = repo.save(&ctx, &mut order).unwrap_err();
        assert!(matches!(err, OrderRepoError::Interrupted(_)));
        assert!(repo.is_empty());
    }
}
