// Ledger pages: dashboard, transactions, yearly summary and categories

use axum::{
    extract::{Form, Path, State},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use super::flash::Flash;
use super::{error_page, redirect_with, redirect_with_error, render_page};
use super::{
    year_rows, AddTransactionTemplate, CategoriesTemplate, DashboardTemplate, HistoryRow,
    HistoryTemplate, PageContext, YearSummaryTemplate,
};
use crate::api::auth::CurrentUser;
use crate::api::error::LedgerError;
use crate::api::validation::{parse_amount_input, validate_category_name};
use crate::db::{Category, CategoryKind, Transaction};
use crate::engine::{dashboard_for, year_summary_for};
use crate::{AppState, CookieJar};

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
) -> Response {
    let snapshot = match dashboard_for(&state.db, &state.clock, user.id).await {
        Ok(snapshot) => snapshot,
        Err(e) => return error_page(e),
    };

    let currency = &state.config.ledger.currency_symbol;
    render_page(jar, |flash| {
        DashboardTemplate::new(PageContext::for_user(&user.username, flash), currency, &snapshot)
    })
}

pub async fn add_page(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
) -> Response {
    let categories = match Category::list_for_user(&state.db, user.id).await {
        Ok(categories) => categories,
        Err(e) => return redirect_with_error(jar, e.into(), "/dashboard"),
    };

    render_page(jar, |flash| AddTransactionTemplate {
        page: PageContext::for_user(&user.username, flash),
        currency: state.config.ledger.currency_symbol.clone(),
        categories,
    })
}

#[derive(Deserialize)]
pub struct AddTransactionForm {
    #[serde(default)]
    category_id: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    note: String,
}

async fn add_transaction(
    state: &AppState,
    user_id: i64,
    form: &AddTransactionForm,
) -> Result<i64, LedgerError> {
    let category_id: i64 = form
        .category_id
        .trim()
        .parse()
        .map_err(|_| LedgerError::validation("Choose a category."))?;
    let amount = parse_amount_input("Amount", &form.amount).map_err(LedgerError::Validation)?;

    // Only the caller's own categories may be booked against
    let category = Category::get_for_user(&state.db, user_id, category_id)
        .await?
        .ok_or_else(|| LedgerError::validation("Choose one of your categories."))?;

    let id = Transaction::create(
        &state.db,
        user_id,
        category.id,
        amount,
        form.note.trim(),
        state.clock.now(),
    )
    .await?;

    tracing::info!(user_id, transaction_id = id, category_id = category.id, "Transaction added");
    Ok(id)
}

pub async fn add_submit(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
    Form(form): Form<AddTransactionForm>,
) -> Response {
    match add_transaction(&state, user.id, &form).await {
        Ok(_) => redirect_with(jar, Flash::success("Transaction added."), "/dashboard"),
        Err(e) => redirect_with_error(jar, e, "/add"),
    }
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
) -> Response {
    let entries = match Transaction::history(&state.db, user.id, state.clock.offset()).await {
        Ok(entries) => entries,
        Err(e) => return redirect_with_error(jar, e.into(), "/dashboard"),
    };

    render_page(jar, |flash| HistoryTemplate {
        page: PageContext::for_user(&user.username, flash),
        currency: state.config.ledger.currency_symbol.clone(),
        rows: entries.iter().map(HistoryRow::from).collect(),
    })
}

/// Delete a transaction of the caller. Missing ids and other users' ids
/// are told apart so the message is accurate.
async fn delete_owned_transaction(state: &AppState, user_id: i64, id: i64) -> Result<(), LedgerError> {
    let transaction = Transaction::get_by_id(&state.db, id, state.clock.offset())
        .await?
        .ok_or(LedgerError::NotFound)?;

    if transaction.user_id != user_id {
        tracing::warn!(user_id, transaction_id = id, "Denied delete of another user's transaction");
        return Err(LedgerError::Forbidden);
    }

    if !Transaction::delete_owned(&state.db, user_id, id).await? {
        return Err(LedgerError::NotFound);
    }

    tracing::info!(user_id, transaction_id = id, "Transaction deleted");
    Ok(())
}

pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Response {
    match delete_owned_transaction(&state, user.id, id).await {
        Ok(()) => redirect_with(jar, Flash::success("Transaction deleted."), "/history"),
        Err(e) => redirect_with_error(jar, e, "/history"),
    }
}

pub async fn year_summary(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
) -> Response {
    let summary = match year_summary_for(&state.db, &state.clock, user.id).await {
        Ok(summary) => summary,
        Err(e) => return redirect_with_error(jar, e, "/dashboard"),
    };

    render_page(jar, |flash| YearSummaryTemplate {
        page: PageContext::for_user(&user.username, flash),
        currency: state.config.ledger.currency_symbol.clone(),
        rows: year_rows(&summary),
    })
}

pub async fn categories_page(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
) -> Response {
    let categories = match Category::list_for_user(&state.db, user.id).await {
        Ok(categories) => categories,
        Err(e) => return redirect_with_error(jar, e.into(), "/dashboard"),
    };

    render_page(jar, |flash| CategoriesTemplate {
        page: PageContext::for_user(&user.username, flash),
        categories,
    })
}

#[derive(Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    kind: String,
    /// Checkbox; present only when ticked
    #[serde(default)]
    is_salary: Option<String>,
}

async fn create_category(
    state: &AppState,
    user_id: i64,
    form: &CategoryForm,
) -> Result<Category, LedgerError> {
    let name = form.name.trim();
    validate_category_name(name).map_err(LedgerError::Validation)?;
    let kind = CategoryKind::from_str(&form.kind)
        .ok_or_else(|| LedgerError::validation("Kind must be income or expense."))?;

    if Category::name_exists(&state.db, user_id, name).await? {
        return Err(LedgerError::validation("A category with this name already exists."));
    }

    let category = Category::create(&state.db, user_id, name, kind, form.is_salary.is_some()).await?;
    tracing::info!(user_id, category_id = category.id, kind = %kind, "Category created");
    Ok(category)
}

pub async fn categories_create(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
    Form(form): Form<CategoryForm>,
) -> Response {
    match create_category(&state, user.id, &form).await {
        Ok(category) => redirect_with(
            jar,
            Flash::success(format!("Category \"{}\" created.", category.name)),
            "/categories",
        ),
        Err(e) => redirect_with_error(jar, e, "/categories"),
    }
}

async fn delete_category(state: &AppState, user_id: i64, id: i64) -> Result<(), LedgerError> {
    let category = Category::get_for_user(&state.db, user_id, id)
        .await?
        .ok_or(LedgerError::NotFound)?;

    if Category::count_transactions(&state.db, category.id).await? > 0 {
        return Err(LedgerError::validation(
            "This category still has transactions and cannot be deleted.",
        ));
    }

    Category::delete_for_user(&state.db, user_id, category.id).await?;
    tracing::info!(user_id, category_id = category.id, "Category deleted");
    Ok(())
}

pub async fn categories_delete(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Response {
    match delete_category(&state, user.id, id).await {
        Ok(()) => redirect_with(jar, Flash::success("Category deleted."), "/categories"),
        Err(e) => redirect_with_error(jar, e, "/categories"),
    }
}
