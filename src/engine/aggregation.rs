//! Dashboard and yearly aggregation.
//!
//! Everything here is a pure reduction over the current ledger and settings.
//! Nothing is cached or materialized: each dashboard view re-reads every
//! transaction of the user, so cost grows linearly with ledger size.

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::api::error::LedgerError;
use crate::db::{CategoryKind, LedgerLine, Transaction, UserSettings};

use super::LedgerClock;

/// Computed state of a user's ledger at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub income: Decimal,
    pub expense: Decimal,
    /// Sum over salary categories, whatever their kind
    pub salary: Decimal,
    pub saving: Decimal,
    pub balance: Decimal,
    pub low_balance_warning: bool,
    /// Threshold the warning was evaluated against
    pub alert_limit: Decimal,
}

/// Income and expense totals for one calendar year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTotals {
    pub year: i32,
    pub income: Decimal,
    pub expense: Decimal,
}

/// A total left the range `Decimal` can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is too large to compute")]
pub struct AmountOverflow(pub &'static str);

fn checked_sum(total: Decimal, amount: Decimal, what: &'static str) -> Result<Decimal, AmountOverflow> {
    total.checked_add(amount).ok_or(AmountOverflow(what))
}

/// `default_saving + salary * saving_percent / 100`
pub fn saving_amount(
    default_saving: Decimal,
    salary: Decimal,
    saving_percent: Decimal,
) -> Result<Decimal, AmountOverflow> {
    salary
        .checked_mul(saving_percent)
        .and_then(|share| share.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|share| default_saving.checked_add(share))
        .ok_or(AmountOverflow("saving"))
}

pub fn compute_snapshot(
    lines: &[LedgerLine],
    settings: &UserSettings,
) -> Result<DashboardSnapshot, AmountOverflow> {
    let mut income = Decimal::ZERO;
    let mut expense = Decimal::ZERO;
    let mut salary = Decimal::ZERO;

    for line in lines {
        match line.kind {
            CategoryKind::Income => income = checked_sum(income, line.amount, "income")?,
            CategoryKind::Expense => expense = checked_sum(expense, line.amount, "expense")?,
        }
        if line.is_salary {
            salary = checked_sum(salary, line.amount, "salary")?;
        }
    }

    let saving = saving_amount(settings.default_saving, salary, settings.saving_percent)?;
    let balance = income
        .checked_sub(expense)
        .and_then(|rest| rest.checked_sub(saving))
        .ok_or(AmountOverflow("balance"))?;

    Ok(DashboardSnapshot {
        income,
        expense,
        salary,
        saving,
        balance,
        low_balance_warning: balance < settings.income_min_alert,
        alert_limit: settings.income_min_alert,
    })
}

/// Group by the calendar year of each timestamp, in the offset it was
/// recorded with. Ascending by year.
pub fn summarize_by_year(lines: &[LedgerLine]) -> Result<Vec<YearTotals>, AmountOverflow> {
    let mut years: BTreeMap<i32, (Decimal, Decimal)> = BTreeMap::new();

    for line in lines {
        let totals = years
            .entry(line.timestamp.year())
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        match line.kind {
            CategoryKind::Income => totals.0 = checked_sum(totals.0, line.amount, "yearly income")?,
            CategoryKind::Expense => totals.1 = checked_sum(totals.1, line.amount, "yearly expense")?,
        }
    }

    Ok(years
        .into_iter()
        .map(|(year, (income, expense))| YearTotals {
            year,
            income,
            expense,
        })
        .collect())
}

/// Load the ledger and settings of a user and reduce them to a snapshot.
/// Creates the settings row on first access.
pub async fn dashboard_for(
    db: &SqlitePool,
    clock: &LedgerClock,
    user_id: i64,
) -> Result<DashboardSnapshot, LedgerError> {
    let lines = Transaction::ledger_lines(db, user_id, clock.offset()).await?;
    let settings = UserSettings::get_or_create(db, user_id).await?;
    Ok(compute_snapshot(&lines, &settings)?)
}

pub async fn year_summary_for(
    db: &SqlitePool,
    clock: &LedgerClock,
    user_id: i64,
) -> Result<Vec<YearTotals>, LedgerError> {
    let lines = Transaction::ledger_lines(db, user_id, clock.offset()).await?;
    Ok(summarize_by_year(&lines)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};

    fn ts(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    fn line(amount: Decimal, kind: CategoryKind, is_salary: bool) -> LedgerLine {
        LedgerLine {
            amount,
            kind,
            is_salary,
            timestamp: ts("2024-06-01T12:00:00+07:00"),
        }
    }

    fn settings(default_saving: i64, saving_percent: i64, alert: Decimal) -> UserSettings {
        UserSettings {
            default_saving: Decimal::from(default_saving),
            saving_percent: Decimal::from(saving_percent),
            income_min_alert: alert,
            ..UserSettings::zeroed(1)
        }
    }

    #[test]
    fn test_salary_scenario() {
        let lines = vec![line(Decimal::from(2000), CategoryKind::Income, true)];
        let snapshot = compute_snapshot(&lines, &settings(500, 10, Decimal::ZERO)).unwrap();

        assert_eq!(snapshot.income, Decimal::from(2000));
        assert_eq!(snapshot.expense, Decimal::ZERO);
        assert_eq!(snapshot.saving, Decimal::from(700));
        assert_eq!(snapshot.balance, Decimal::from(1300));
        assert!(!snapshot.low_balance_warning);
    }

    #[test]
    fn test_empty_ledger_is_all_zero() {
        let snapshot = compute_snapshot(&[], &UserSettings::zeroed(1)).unwrap();
        assert_eq!(snapshot.income, Decimal::ZERO);
        assert_eq!(snapshot.expense, Decimal::ZERO);
        assert_eq!(snapshot.saving, Decimal::ZERO);
        assert_eq!(snapshot.balance, Decimal::ZERO);
        assert!(!snapshot.low_balance_warning);
    }

    #[test]
    fn test_balance_identity_is_exact() {
        let lines = vec![
            line(Decimal::new(1, 1), CategoryKind::Income, false),
            line(Decimal::new(2, 1), CategoryKind::Income, true),
            line(Decimal::new(3, 1), CategoryKind::Expense, false),
            line(Decimal::new(1999, 2), CategoryKind::Expense, false),
            line(Decimal::new(-5, 0), CategoryKind::Income, false),
        ];
        let snapshot = compute_snapshot(&lines, &settings(3, 33, Decimal::ZERO)).unwrap();

        assert_eq!(snapshot.income, Decimal::new(-47, 1));
        assert_eq!(
            snapshot.income - snapshot.expense - snapshot.saving,
            snapshot.balance
        );
        // 0.1 + 0.2 stays 0.3 exactly
        let pair = compute_snapshot(&lines[..2], &UserSettings::zeroed(1)).unwrap();
        assert_eq!(pair.income, Decimal::new(3, 1));
    }

    #[test]
    fn test_zero_percent_saving_is_default_saving() {
        for salary in [0i64, 1, 2000, 1_000_000] {
            assert_eq!(
                saving_amount(Decimal::from(250), Decimal::from(salary), Decimal::ZERO),
                Ok(Decimal::from(250))
            );
        }
    }

    #[test]
    fn test_saving_formula_over_percent_range() {
        let salary = Decimal::from(3000);
        for percent in 0..=100 {
            let expected = Decimal::from(100) + Decimal::from(30 * percent);
            assert_eq!(
                saving_amount(Decimal::from(100), salary, Decimal::from(percent)),
                Ok(expected)
            );
        }
    }

    #[test]
    fn test_salary_is_flag_based_not_kind_based() {
        // A salary-flagged expense category still feeds the saving
        let lines = vec![
            line(Decimal::from(1000), CategoryKind::Expense, true),
            line(Decimal::from(5000), CategoryKind::Income, false),
        ];
        let snapshot = compute_snapshot(&lines, &settings(0, 50, Decimal::ZERO)).unwrap();
        assert_eq!(snapshot.salary, Decimal::from(1000));
        assert_eq!(snapshot.saving, Decimal::from(500));
        assert_eq!(snapshot.balance, Decimal::from(3500));
    }

    #[test]
    fn test_low_balance_boundary() {
        let lines = vec![line(Decimal::from(1000), CategoryKind::Income, false)];

        let at_limit = compute_snapshot(&lines, &settings(0, 0, Decimal::from(1000))).unwrap();
        assert!(!at_limit.low_balance_warning);

        let epsilon = Decimal::new(1, 2);
        let above_limit =
            compute_snapshot(&lines, &settings(0, 0, Decimal::from(1000) + epsilon)).unwrap();
        assert!(above_limit.low_balance_warning);

        let below_limit =
            compute_snapshot(&lines, &settings(0, 0, Decimal::from(1000) - epsilon)).unwrap();
        assert!(!below_limit.low_balance_warning);
    }

    #[test]
    fn test_year_summary_ordering_and_totals() {
        let lines = vec![
            LedgerLine {
                timestamp: ts("2024-02-01T00:00:00+07:00"),
                ..line(Decimal::from(40), CategoryKind::Expense, false)
            },
            LedgerLine {
                timestamp: ts("2023-05-01T00:00:00+07:00"),
                ..line(Decimal::from(100), CategoryKind::Income, false)
            },
            LedgerLine {
                timestamp: ts("2024-08-01T00:00:00+07:00"),
                ..line(Decimal::from(60), CategoryKind::Income, true)
            },
        ];

        let summary = summarize_by_year(&lines).unwrap();
        assert_eq!(
            summary,
            vec![
                YearTotals {
                    year: 2023,
                    income: Decimal::from(100),
                    expense: Decimal::ZERO
                },
                YearTotals {
                    year: 2024,
                    income: Decimal::from(60),
                    expense: Decimal::from(40)
                },
            ]
        );
    }

    #[test]
    fn test_year_uses_recorded_offset() {
        // 2023-12-31 18:00 UTC is already 2024 in UTC+7
        let lines = vec![LedgerLine {
            timestamp: ts("2024-01-01T01:00:00+07:00"),
            ..line(Decimal::from(100), CategoryKind::Income, false)
        }];
        assert_eq!(summarize_by_year(&lines).unwrap()[0].year, 2024);
    }

    #[test]
    fn test_overflowing_totals_are_errors() {
        let lines = vec![
            line(Decimal::MAX, CategoryKind::Income, false),
            line(Decimal::MAX, CategoryKind::Income, false),
        ];
        assert_eq!(
            compute_snapshot(&lines, &UserSettings::zeroed(1)),
            Err(AmountOverflow("income"))
        );
        assert_eq!(summarize_by_year(&lines), Err(AmountOverflow("yearly income")));

        // Each total fits, the salary share does not
        let huge_salary = vec![line(
            Decimal::from_str_exact("1000000000000000000000000000").unwrap(),
            CategoryKind::Income,
            true,
        )];
        assert_eq!(
            compute_snapshot(&huge_salary, &settings(0, 100, Decimal::ZERO)),
            Err(AmountOverflow("saving"))
        );

        let spread = vec![
            line(Decimal::MAX, CategoryKind::Income, false),
            line(Decimal::MIN, CategoryKind::Expense, false),
        ];
        assert_eq!(
            compute_snapshot(&spread, &UserSettings::zeroed(1)),
            Err(AmountOverflow("balance"))
        );
    }

    #[tokio::test]
    async fn test_dashboard_for_reads_current_state() {
        use crate::db::{test_pool, Category, NewUser, User};

        let db = test_pool().await;
        let clock = LedgerClock::new(FixedOffset::east_opt(7 * 3600).unwrap());
        let uid = User::create(
            &db,
            &NewUser {
                username: "alice",
                email: "alice@example.com",
                password_hash: "h",
                security_question: "",
                security_answer_hash: "",
            },
        )
        .await
        .unwrap();

        let salary = Category::create(&db, uid, "Salary", CategoryKind::Income, true)
            .await
            .unwrap();
        let rent = Category::create(&db, uid, "Rent", CategoryKind::Expense, false)
            .await
            .unwrap();
        Transaction::create(&db, uid, salary.id, Decimal::from(2000), "", clock.now())
            .await
            .unwrap();
        Transaction::create(&db, uid, rent.id, Decimal::from(800), "", clock.now())
            .await
            .unwrap();
        UserSettings::update_savings(
            &db,
            uid,
            &crate::db::SavingsUpdate {
                default_saving: Decimal::from(500),
                saving_percent: Decimal::from(10),
                income_min_alert: Decimal::from(600),
            },
        )
        .await
        .unwrap();

        let snapshot = dashboard_for(&db, &clock, uid).await.unwrap();
        assert_eq!(snapshot.balance, Decimal::from(500));
        assert!(snapshot.low_balance_warning);

        let summary = year_summary_for(&db, &clock, uid).await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].income, Decimal::from(2000));
        assert_eq!(summary[0].expense, Decimal::from(800));
    }
}
