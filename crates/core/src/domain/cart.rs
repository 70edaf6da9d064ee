use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::context::SimType;

pub const DEFAULT_CART_TTL_MINUTES: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSim {
    pub sim_type: SimType,
    pub icc_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub line_number: usize,
    pub plan: Option<CartItem>,
    pub device: Option<CartItem>,
    pub protection: Option<CartItem>,
    pub sim: Option<CartSim>,
}

impl CartLine {
    fn blank(line_number: usize) -> Self {
        Self { line_number, plan: None, device: None, protection: None, sim: None }
    }

    fn item_total(&self) -> Decimal {
        [&self.plan, &self.device, &self.protection]
            .into_iter()
            .flatten()
            .map(|item| item.price)
            .sum()
    }
}

/// Per-session order cart, line-number-aligned with the session's
/// `FlowContext`. `total` is a derived projection and is recomputed on
/// every mutation, never stored stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub session_id: String,
    pub lines: Vec<CartLine>,
    pub total: Decimal,
    pub expires_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_ttl(session_id, Duration::minutes(DEFAULT_CART_TTL_MINUTES))
    }

    pub fn with_ttl(session_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            lines: Vec::new(),
            total: Decimal::ZERO,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn line(&self, line_number: usize) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.line_number == line_number)
    }

    pub fn set_plan(&mut self, line_number: usize, plan: CartItem) {
        let line = self.line_entry(line_number);
        line.plan = Some(plan);
        if line.sim.is_none() {
            line.sim = Some(CartSim { sim_type: SimType::Esim, icc_id: None });
        }
        self.recompute_total();
    }

    pub fn set_device(&mut self, line_number: usize, device: CartItem) {
        self.line_entry(line_number).device = Some(device);
        self.recompute_total();
    }

    pub fn set_protection(&mut self, line_number: usize, protection: CartItem) {
        self.line_entry(line_number).protection = Some(protection);
        self.recompute_total();
    }

    pub fn set_sim(&mut self, line_number: usize, sim: CartSim) {
        self.line_entry(line_number).sim = Some(sim);
        self.recompute_total();
    }

    /// Drop cart lines beyond the session's configured line count, keeping
    /// the cart aligned after a shrink.
    pub fn align_to_line_count(&mut self, line_count: usize) {
        self.lines.retain(|line| line.line_number <= line_count);
        self.recompute_total();
    }

    pub fn recompute_total(&mut self) {
        self.total = self.lines.iter().map(CartLine::item_total).sum();
    }

    fn line_entry(&mut self, line_number: usize) -> &mut CartLine {
        if let Some(index) = self.lines.iter().position(|line| line.line_number == line_number) {
            return &mut self.lines[index];
        }
        let index = self
            .lines
            .iter()
            .position(|line| line.line_number > line_number)
            .unwrap_or(self.lines.len());
        self.lines.insert(index, CartLine::blank(line_number));
        &mut self.lines[index]
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::context::SimType;

    use super::{Cart, CartItem, CartSim};

    fn item(id: &str, price_cents: i64) -> CartItem {
        CartItem { id: id.to_string(), name: id.to_string(), price: Decimal::new(price_cents, 2) }
    }

    #[test]
    fn total_tracks_every_mutation() {
        let mut cart = Cart::new("s-1");
        cart.set_plan(1, item("plan-unlimited", 7_000));
        cart.set_device(1, item("device-a54", 44_900));
        cart.set_plan(2, item("plan-basic", 4_000));

        assert_eq!(cart.total, Decimal::new(55_900, 2));

        cart.set_protection(1, item("prot-full", 1_500));
        assert_eq!(cart.total, Decimal::new(57_400, 2));
    }

    #[test]
    fn lines_stay_ordered_by_line_number() {
        let mut cart = Cart::new("s-1");
        cart.set_plan(3, item("plan-c", 1_000));
        cart.set_plan(1, item("plan-a", 1_000));
        cart.set_plan(2, item("plan-b", 1_000));

        let numbers = cart.lines.iter().map(|line| line.line_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn plan_defaults_sim_to_esim() {
        let mut cart = Cart::new("s-1");
        cart.set_plan(1, item("plan-basic", 4_000));
        assert_eq!(cart.line(1).and_then(|l| l.sim.as_ref()).map(|s| s.sim_type), Some(SimType::Esim));

        cart.set_sim(1, CartSim { sim_type: SimType::Physical, icc_id: None });
        assert_eq!(
            cart.line(1).and_then(|l| l.sim.as_ref()).map(|s| s.sim_type),
            Some(SimType::Physical)
        );
    }

    #[test]
    fn align_drops_lines_past_the_new_count() {
        let mut cart = Cart::new("s-1");
        cart.set_plan(1, item("plan-a", 4_000));
        cart.set_plan(2, item("plan-b", 4_000));
        cart.set_plan(3, item("plan-c", 4_000));

        cart.align_to_line_count(1);
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.total, Decimal::new(4_000, 2));
    }

    #[test]
    fn expiry_is_an_absolute_cutoff() {
        let cart = Cart::with_ttl("s-1", Duration::minutes(30));
        let now = Utc::now();
        assert!(!cart.is_expired(now));
        assert!(cart.is_expired(now + Duration::minutes(31)));
    }
}
