//! Pure report computations over a window of transactions and the active
//! subscriptions of a single owner.
//!
//! Amounts are signed: negative amounts are expenses and are accumulated as
//! their magnitude, everything else is income. Sums are plain `f64`
//! additions without rounding.

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;

use crate::models::{
    Balance, BudgetSummary, Category, CategoryBreakdown, CategoryRef, CategoryStat, OverviewStats,
    Split, Subscription, Transaction,
};

/// Income and expense magnitudes accumulated by sign.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Totals {
    pub income: f64,
    pub expenses: f64,
}

impl Totals {
    pub fn add(&mut self, amount: f64) {
        if amount < 0.0 {
            self.expenses += amount.abs();
        } else {
            self.income += amount;
        }
    }

    pub fn balance(&self) -> f64 {
        self.income - self.expenses
    }
}

/// Totals split into what already happened and what is still due.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Buckets {
    pub received: Totals,
    pub upcoming: Totals,
}

impl Buckets {
    /// Sorts `transactions` into received (`processed_at <= now`) and
    /// upcoming, then folds every subscription that still executes later
    /// this month into upcoming. Subscriptions never count as received.
    pub fn collect(
        transactions: &[Transaction],
        subscriptions: &[Subscription],
        now: OffsetDateTime,
    ) -> Self {
        let mut buckets = Buckets::default();

        for transaction in transactions {
            if transaction.processed_at <= now {
                buckets.received.add(transaction.transfer_amount);
            } else {
                buckets.upcoming.add(transaction.transfer_amount);
            }
        }

        let today = now.day();
        for subscription in subscriptions.iter().filter(|s| s.is_upcoming(today)) {
            buckets.upcoming.add(subscription.transfer_amount);
        }

        buckets
    }

    fn projected(&self) -> Totals {
        Totals {
            income: self.received.income + self.upcoming.income,
            expenses: self.received.expenses + self.upcoming.expenses,
        }
    }
}

pub fn overview(buckets: &Buckets) -> OverviewStats {
    OverviewStats {
        income: Split {
            received: buckets.received.income,
            upcoming: buckets.upcoming.income,
        },
        expenses: Split {
            received: buckets.received.expenses,
            upcoming: buckets.upcoming.expenses,
        },
        balance: Balance {
            current: buckets.received.balance(),
            estimated: buckets.projected().balance(),
        },
    }
}

/// Received income only shows up through `free_amount`.
pub fn budget(buckets: &Buckets) -> BudgetSummary {
    BudgetSummary {
        expenses: buckets.received.expenses,
        upcoming_expenses: buckets.upcoming.expenses,
        free_amount: buckets.projected().balance(),
    }
}

/// Distinct category ids in first-observation order. Uncategorized
/// transactions contribute no id.
pub fn category_ids(transactions: &[Transaction]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut ids: Vec<String> = Vec::new();
    for id in transactions.iter().filter_map(|t| t.category.as_deref()) {
        if seen.insert(id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Per-category income, expenses and balance over every transaction in the
/// window, regardless of whether it is received or upcoming. Subscriptions do
/// not take part.
///
/// Entries follow the order in which each category was first seen.
/// `categories` resolves display names; ids it does not contain are reported
/// with no name.
pub fn category_breakdown(
    transactions: &[Transaction],
    categories: &[Category],
) -> CategoryBreakdown {
    let names: HashMap<&str, &str> = categories
        .iter()
        .map(|category| (category.id.as_str(), category.name.as_str()))
        .collect();

    let mut order: Vec<Option<&str>> = Vec::new();
    let mut totals: HashMap<Option<&str>, Totals> = HashMap::new();
    for transaction in transactions {
        let key = transaction.category.as_deref();
        let entry = totals.entry(key).or_insert_with(|| {
            order.push(key);
            Totals::default()
        });
        entry.add(transaction.transfer_amount);
    }

    let categories = order
        .into_iter()
        .map(|key| {
            let stat = totals.get(&key).copied().unwrap_or_default();
            CategoryStat {
                category: key.map(|id| CategoryRef {
                    id: id.to_string(),
                    name: names.get(id).map(|name| name.to_string()),
                }),
                income: stat.income,
                expenses: stat.expenses,
                balance: stat.balance(),
            }
        })
        .collect();

    CategoryBreakdown { categories }
}
