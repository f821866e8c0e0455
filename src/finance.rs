//! Financial domain state
//!
//! Profile, budget, expense, and advisor-session records used by the
//! worker agents, plus the formatted context blocks they embed into
//! prompts. Kept in memory behind a lock; persistence beyond the
//! conversation log is an external collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "DZD";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub monthly_income: Option<f64>,
    pub savings: Option<f64>,
    pub investments: Option<f64>,
    pub debts: Option<f64>,
    pub personal_info: Option<Value>,
    pub user_ai_preferences: Option<Value>,
    pub extra_info: Option<Value>,
    pub ai_summary: Option<String>,
}

impl UserProfile {
    /// Preferred currency from personal_info, defaulting to DZD.
    pub fn currency(&self) -> String {
        self.personal_info
            .as_ref()
            .and_then(|info| info.get("preferred_currency"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CURRENCY)
            .to_string()
    }
}

/// Partial profile update; only present fields are written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub monthly_income: Option<f64>,
    pub savings: Option<f64>,
    pub investments: Option<f64>,
    pub debts: Option<f64>,
    pub personal_info: Option<Value>,
    pub user_ai_preferences: Option<Value>,
    pub extra_info: Option<Value>,
    pub ai_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub title: String,
    pub budget: f64,
    pub spent: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub product_name: String,
    pub amount: f64,
    pub budget_title: Option<String>,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorSession {
    pub query_type: String,
    pub user_query: String,
    pub ai_response: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct UserRecords {
    profile: UserProfile,
    budgets: Vec<Budget>,
    expenses: Vec<Expense>,
    advisor_sessions: Vec<AdvisorSession>,
}

/// In-memory financial state, keyed by user.
pub struct FinanceStore {
    users: RwLock<HashMap<Uuid, UserRecords>>,
}

impl FinanceStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    //
    // ================= Profile =================
    //

    pub async fn profile(&self, user_id: Uuid) -> UserProfile {
        self.users
            .read()
            .await
            .get(&user_id)
            .map(|r| r.profile.clone())
            .unwrap_or_default()
    }

    pub async fn save_profile(&self, user_id: Uuid, profile: UserProfile) {
        let mut users = self.users.write().await;
        users.entry(user_id).or_default().profile = profile;
    }

    /// Apply a partial update and return the resulting profile.
    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> UserProfile {
        let mut users = self.users.write().await;
        let profile = &mut users.entry(user_id).or_default().profile;

        if let Some(v) = update.monthly_income {
            profile.monthly_income = Some(v);
        }
        if let Some(v) = update.savings {
            profile.savings = Some(v);
        }
        if let Some(v) = update.investments {
            profile.investments = Some(v);
        }
        if let Some(v) = update.debts {
            profile.debts = Some(v);
        }
        if let Some(v) = update.personal_info {
            profile.personal_info = Some(v);
        }
        if let Some(v) = update.user_ai_preferences {
            profile.user_ai_preferences = Some(v);
        }
        if let Some(v) = update.extra_info {
            profile.extra_info = Some(v);
        }
        if let Some(v) = update.ai_summary {
            profile.ai_summary = Some(v);
        }

        profile.clone()
    }

    //
    // ================= Budgets =================
    //

    pub async fn budgets(&self, user_id: Uuid) -> Vec<Budget> {
        self.users
            .read()
            .await
            .get(&user_id)
            .map(|r| r.budgets.clone())
            .unwrap_or_default()
    }

    pub async fn add_budget(&self, user_id: Uuid, budget: Budget) {
        let mut users = self.users.write().await;
        users.entry(user_id).or_default().budgets.push(budget);
    }

    /// Update an existing budget by title; only present fields are
    /// written. Returns false when no budget matches.
    pub async fn edit_budget(
        &self,
        user_id: Uuid,
        title: &str,
        budget: Option<f64>,
        spent: Option<f64>,
        description: Option<String>,
    ) -> bool {
        let mut users = self.users.write().await;
        let Some(records) = users.get_mut(&user_id) else {
            return false;
        };
        let Some(entry) = records.budgets.iter_mut().find(|b| b.title == title) else {
            return false;
        };

        if let Some(v) = budget {
            entry.budget = v;
        }
        if let Some(v) = spent {
            entry.spent = v;
        }
        if let Some(v) = description {
            entry.description = Some(v);
        }
        true
    }

    /// Returns false when no budget matches.
    pub async fn delete_budget(&self, user_id: Uuid, title: &str) -> bool {
        let mut users = self.users.write().await;
        let Some(records) = users.get_mut(&user_id) else {
            return false;
        };
        let before = records.budgets.len();
        records.budgets.retain(|b| b.title != title);
        records.budgets.len() < before
    }

    //
    // ================= Expenses =================
    //

    /// Record an expense; a matching budget category absorbs the amount
    /// into its spent total.
    pub async fn record_expense(&self, user_id: Uuid, expense: Expense) {
        let mut users = self.users.write().await;
        let records = users.entry(user_id).or_default();

        if let Some(title) = &expense.budget_title {
            if let Some(budget) = records.budgets.iter_mut().find(|b| &b.title == title) {
                budget.spent += expense.amount;
            }
        }

        records.expenses.push(expense);
    }

    /// Most recent expenses, newest first.
    pub async fn recent_expenses(&self, user_id: Uuid, count: usize) -> Vec<Expense> {
        self.users
            .read()
            .await
            .get(&user_id)
            .map(|r| r.expenses.iter().rev().take(count).cloned().collect())
            .unwrap_or_default()
    }

    //
    // ================= Advisor Sessions =================
    //

    pub async fn record_advisor_session(&self, user_id: Uuid, session: AdvisorSession) {
        let mut users = self.users.write().await;
        users.entry(user_id).or_default().advisor_sessions.push(session);
    }

    pub async fn advisor_sessions(&self, user_id: Uuid) -> Vec<AdvisorSession> {
        self.users
            .read()
            .await
            .get(&user_id)
            .map(|r| r.advisor_sessions.clone())
            .unwrap_or_default()
    }

    //
    // ================= Prompt Context =================
    //

    /// Profile block injected into a conversation's first message.
    pub async fn profile_context(&self, user_id: Uuid) -> String {
        let profile = self.profile(user_id).await;

        let mut out = String::from("USER FINANCIAL PROFILE:\n");
        let _ = writeln!(out, "- Monthly Income: {}", fmt_amount(profile.monthly_income));
        let _ = writeln!(out, "- Savings: {}", fmt_amount(profile.savings));
        let _ = writeln!(out, "- Investments: {}", fmt_amount(profile.investments));
        let _ = writeln!(out, "- Debts: {}", fmt_amount(profile.debts));
        let _ = writeln!(out, "- Currency: {}", profile.currency());
        if let Some(prefs) = &profile.user_ai_preferences {
            let _ = writeln!(out, "- AI Preferences: {}", prefs);
        }
        if let Some(extra) = &profile.extra_info {
            let _ = writeln!(out, "- Extra Info: {}", extra);
        }
        if let Some(summary) = &profile.ai_summary {
            let _ = writeln!(out, "- Summary: {}", summary);
        }
        out
    }

    /// Current budget table for the budget agent's prompt.
    pub async fn budget_table(&self, user_id: Uuid) -> String {
        let budgets = self.budgets(user_id).await;
        if budgets.is_empty() {
            return "No budgets set".to_string();
        }
        budgets
            .iter()
            .map(|b| format!("- {}: Budget={}, Spent={}", b.title, b.budget, b.spent))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Full financial context for the advisor: profile, budget totals and
    /// categories, recent expenses.
    pub async fn financial_context(&self, user_id: Uuid) -> String {
        let profile = self.profile(user_id).await;
        let budgets = self.budgets(user_id).await;
        let recent = self.recent_expenses(user_id, 10).await;
        let currency = profile.currency();

        let total_budget: f64 = budgets.iter().map(|b| b.budget).sum();
        let total_spent: f64 = budgets.iter().map(|b| b.spent).sum();

        let mut out = String::from("USER FINANCIAL PROFILE:\n");
        let _ = writeln!(
            out,
            "- Monthly Income: {} {}",
            fmt_amount(profile.monthly_income),
            currency
        );
        let _ = writeln!(out, "- Savings: {} {}", fmt_amount(profile.savings), currency);
        let _ = writeln!(
            out,
            "- Investments: {} {}",
            fmt_amount(profile.investments),
            currency
        );
        let _ = writeln!(out, "- Debts: {} {}", fmt_amount(profile.debts), currency);

        let _ = writeln!(out, "\nBUDGET OVERVIEW:");
        let _ = writeln!(out, "Total Budget: {} {}", total_budget, currency);
        let _ = writeln!(out, "Total Spent: {} {}", total_spent, currency);
        let _ = writeln!(out, "Remaining: {} {}", total_budget - total_spent, currency);

        let _ = writeln!(out, "\nBUDGET CATEGORIES:");
        if budgets.is_empty() {
            let _ = writeln!(out, "No budgets set");
        } else {
            for b in &budgets {
                let _ = writeln!(
                    out,
                    "- {}: Budget {} {c}, Spent {} {c}, Remaining {} {c}",
                    b.title,
                    b.budget,
                    b.spent,
                    b.budget - b.spent,
                    c = currency
                );
            }
        }

        let _ = writeln!(out, "\nRECENT EXPENSES (Last 10):");
        if recent.is_empty() {
            let _ = writeln!(out, "No expenses recorded");
        } else {
            for e in &recent {
                let _ = writeln!(
                    out,
                    "- {}: {} ({} {}) - {}",
                    e.date.date_naive(),
                    e.product_name,
                    e.amount,
                    currency,
                    e.budget_title.as_deref().unwrap_or("Uncategorized")
                );
            }
        }

        out
    }
}

impl Default for FinanceStore {
    fn default() -> Self {
        Self::new()
    }
}

fn fmt_amount(value: Option<f64>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rent(amount: f64) -> Budget {
        Budget {
            title: "Rent".to_string(),
            budget: amount,
            spent: 0.0,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_profile_partial_update() {
        let store = FinanceStore::new();
        let user_id = Uuid::new_v4();

        store
            .update_profile(
                user_id,
                ProfileUpdate {
                    monthly_income: Some(75000.0),
                    ..Default::default()
                },
            )
            .await;
        let profile = store
            .update_profile(
                user_id,
                ProfileUpdate {
                    savings: Some(10000.0),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(profile.monthly_income, Some(75000.0));
        assert_eq!(profile.savings, Some(10000.0));
        assert_eq!(profile.debts, None);
    }

    #[tokio::test]
    async fn test_budget_edit_and_delete() {
        let store = FinanceStore::new();
        let user_id = Uuid::new_v4();

        store.add_budget(user_id, rent(12000.0)).await;

        assert!(store.edit_budget(user_id, "Rent", Some(15000.0), None, None).await);
        assert_eq!(store.budgets(user_id).await[0].budget, 15000.0);

        // Unknown titles are reported, not created.
        assert!(!store.edit_budget(user_id, "Groceries", Some(500.0), None, None).await);
        assert!(!store.delete_budget(user_id, "Groceries").await);

        assert!(store.delete_budget(user_id, "Rent").await);
        assert!(store.budgets(user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_expense_bumps_matching_budget() {
        let store = FinanceStore::new();
        let user_id = Uuid::new_v4();
        store.add_budget(user_id, rent(12000.0)).await;

        store
            .record_expense(
                user_id,
                Expense {
                    product_name: "October rent".to_string(),
                    amount: 12000.0,
                    budget_title: Some("Rent".to_string()),
                    description: None,
                    date: Utc::now(),
                },
            )
            .await;
        store
            .record_expense(
                user_id,
                Expense {
                    product_name: "Coffee".to_string(),
                    amount: 500.0,
                    budget_title: None,
                    description: None,
                    date: Utc::now(),
                },
            )
            .await;

        assert_eq!(store.budgets(user_id).await[0].spent, 12000.0);
        let recent = store.recent_expenses(user_id, 10).await;
        assert_eq!(recent.len(), 2);
        // Newest first.
        assert_eq!(recent[0].product_name, "Coffee");
    }

    #[tokio::test]
    async fn test_financial_context_mentions_budgets_and_expenses() {
        let store = FinanceStore::new();
        let user_id = Uuid::new_v4();
        store
            .update_profile(
                user_id,
                ProfileUpdate {
                    monthly_income: Some(50000.0),
                    ..Default::default()
                },
            )
            .await;
        store.add_budget(user_id, rent(15000.0)).await;

        let context = store.financial_context(user_id).await;
        assert!(context.contains("Monthly Income: 50000"));
        assert!(context.contains("Rent"));
        assert!(context.contains("No expenses recorded"));
        assert!(context.contains(DEFAULT_CURRENCY));
    }
}
