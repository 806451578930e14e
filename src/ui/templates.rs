// Askama template definitions

use askama::Template;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::flash::Flash;
use crate::db::{Category, CategoryKind, HistoryEntry};
use crate::engine::{DashboardSnapshot, YearTotals};

/// Custom filters for Askama templates
mod filters {
    pub fn shorten(s: &str, len: usize) -> ::askama::Result<String> {
        if s.chars().count() <= len {
            Ok(s.to_string())
        } else {
            Ok(format!("{}...", s.chars().take(len).collect::<String>()))
        }
    }
}

/// Two decimals with thousands separators, e.g. `-1,234.50`
pub fn format_amount(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}

/// Fields every page layout reads
pub struct PageContext {
    /// Empty for anonymous pages
    pub username: String,
    pub flash: Option<Flash>,
}

impl PageContext {
    pub fn anonymous(flash: Option<Flash>) -> Self {
        Self {
            username: String::new(),
            flash,
        }
    }

    pub fn for_user(username: &str, flash: Option<Flash>) -> Self {
        Self {
            username: username.to_string(),
            flash,
        }
    }
}

// Login template
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub page: PageContext,
}

#[derive(Template)]
#[template(path = "forgot_password.html")]
pub struct ForgotPasswordTemplate {
    pub page: PageContext,
}

// Dashboard template
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub page: PageContext,
    pub currency: String,
    pub income: String,
    pub expense: String,
    pub salary: String,
    pub saving: String,
    pub balance: String,
    pub balance_negative: bool,
    pub low_balance_warning: bool,
    pub alert_limit: String,
    /// Raw value for the inline alert form
    pub alert_limit_input: String,
}

impl DashboardTemplate {
    pub fn new(page: PageContext, currency: &str, snapshot: &DashboardSnapshot) -> Self {
        Self {
            page,
            currency: currency.to_string(),
            income: format_amount(snapshot.income),
            expense: format_amount(snapshot.expense),
            salary: format_amount(snapshot.salary),
            saving: format_amount(snapshot.saving),
            balance: format_amount(snapshot.balance),
            balance_negative: snapshot.balance.is_sign_negative() && !snapshot.balance.is_zero(),
            low_balance_warning: snapshot.low_balance_warning,
            alert_limit: format_amount(snapshot.alert_limit),
            alert_limit_input: snapshot.alert_limit.normalize().to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "add_transaction.html")]
pub struct AddTransactionTemplate {
    pub page: PageContext,
    pub currency: String,
    pub categories: Vec<Category>,
}

// History row (formatted for display)
pub struct HistoryRow {
    pub id: i64,
    pub date: String,
    pub category: String,
    pub kind: String,
    pub is_income: bool,
    pub amount: String,
    pub note: String,
}

impl From<&HistoryEntry> for HistoryRow {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id,
            date: entry.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            category: entry.category.clone(),
            kind: entry.kind.to_string(),
            is_income: entry.kind == CategoryKind::Income,
            amount: format_amount(entry.amount),
            note: entry.note.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "history.html")]
pub struct HistoryTemplate {
    pub page: PageContext,
    pub currency: String,
    pub rows: Vec<HistoryRow>,
}

#[derive(Template)]
#[template(path = "settings.html")]
pub struct SettingsTemplate {
    pub page: PageContext,
    pub default_saving: String,
    pub saving_percent: String,
    pub income_min_alert: String,
}

// Year summary row with bar widths relative to the largest total
pub struct YearRow {
    pub year: i32,
    pub income: String,
    pub expense: String,
    pub net: String,
    pub income_pct: u32,
    pub expense_pct: u32,
}

fn bar_percent(value: Decimal, max: Decimal) -> u32 {
    if max <= Decimal::ZERO || value <= Decimal::ZERO {
        return 0;
    }
    value
        .checked_div(max)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|pct| pct.round().to_u32())
        .unwrap_or(0)
        .min(100)
}

pub fn year_rows(summary: &[YearTotals]) -> Vec<YearRow> {
    let max = summary
        .iter()
        .flat_map(|y| [y.income, y.expense])
        .max()
        .unwrap_or(Decimal::ZERO);

    summary
        .iter()
        .map(|y| YearRow {
            year: y.year,
            income: format_amount(y.income),
            expense: format_amount(y.expense),
            net: y
                .income
                .checked_sub(y.expense)
                .map(format_amount)
                .unwrap_or_else(|| "n/a".to_string()),
            income_pct: bar_percent(y.income, max),
            expense_pct: bar_percent(y.expense, max),
        })
        .collect()
}

#[derive(Template)]
#[template(path = "year_summary.html")]
pub struct YearSummaryTemplate {
    pub page: PageContext,
    pub currency: String,
    pub rows: Vec<YearRow>,
}

#[derive(Template)]
#[template(path = "categories.html")]
pub struct CategoriesTemplate {
    pub page: PageContext,
    pub categories: Vec<Category>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
        assert_eq!(format_amount(Decimal::new(12345, 1)), "1,234.50");
        assert_eq!(format_amount(Decimal::new(-1_000_000_005, 3)), "-1,000,000.01");
        assert_eq!(format_amount(Decimal::new(999, 0)), "999.00");
        assert_eq!(format_amount(Decimal::new(-1, 3)), "0.00");
    }

    #[test]
    fn test_year_rows_scale_bars_to_largest_total() {
        let summary = vec![
            YearTotals {
                year: 2023,
                income: Decimal::from(200),
                expense: Decimal::from(50),
            },
            YearTotals {
                year: 2024,
                income: Decimal::from(100),
                expense: Decimal::from(-10),
            },
        ];

        let rows = year_rows(&summary);
        assert_eq!(rows[0].income_pct, 100);
        assert_eq!(rows[0].expense_pct, 25);
        assert_eq!(rows[1].income_pct, 50);
        assert_eq!(rows[1].expense_pct, 0);
        assert_eq!(rows[1].net, "110.00");
    }

    #[test]
    fn test_year_rows_survive_extreme_totals() {
        let summary = vec![YearTotals {
            year: 2024,
            income: Decimal::MAX,
            expense: Decimal::MIN,
        }];

        let rows = year_rows(&summary);
        assert_eq!(rows[0].income_pct, 100);
        assert_eq!(rows[0].expense_pct, 0);
        assert_eq!(rows[0].net, "n/a");
    }

    #[test]
    fn test_templates_render() {
        let snapshot = DashboardSnapshot {
            income: Decimal::from(2000),
            expense: Decimal::ZERO,
            salary: Decimal::from(2000),
            saving: Decimal::from(700),
            balance: Decimal::from(1300),
            low_balance_warning: true,
            alert_limit: Decimal::from(1500),
        };
        let html = DashboardTemplate::new(
            PageContext::for_user("alice", Some(Flash::success("Saved"))),
            "฿",
            &snapshot,
        )
        .render()
        .unwrap();
        assert!(html.contains("1,300.00"));
        assert!(html.contains("alice"));
        assert!(html.contains("Saved"));

        let login = LoginTemplate {
            page: PageContext::anonymous(None),
        }
        .render()
        .unwrap();
        assert!(login.contains("action=\"/login\""));
    }
}
