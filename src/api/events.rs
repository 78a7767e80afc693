//! Live change notifications over Server-Sent Events

use std::{collections::HashSet, convert::Infallible};

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use utoipa::IntoParams;

use crate::{
    error::{AppError, AppResult},
    models::{
        event::{ChangeEvent, ChangeTable},
        user::UserClaims,
    },
};

use super::{authenticate, AuthenticatedUser};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Comma-separated tables to follow, e.g. `books,borrowings`; all when absent
    pub tables: Option<String>,
    /// Token for clients that cannot send an Authorization header
    pub access_token: Option<String>,
}

/// Stream row changes as they are committed
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    security(("bearer_auth" = [])),
    params(EventsQuery),
    responses(
        (status = 200, description = "text/event-stream of ChangeEvent JSON payloads", body = ChangeEvent),
        (status = 400, description = "Unknown table"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn stream_events(
    State(state): State<crate::AppState>,
    user: Option<AuthenticatedUser>,
    Query(query): Query<EventsQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let claims = match (user, query.access_token.as_deref()) {
        (Some(AuthenticatedUser(claims)), _) => claims,
        (None, Some(token)) => authenticate(token, &state)?,
        (None, None) => {
            return Err(AppError::Authentication("Missing authorization header".to_string()))
        }
    };
    let tables = parse_tables(query.tables.as_deref())?;

    tracing::debug!(user_id = %claims.user_id(), ?tables, "change feed subscriber connected");

    let stream = BroadcastStream::new(state.services.events.subscribe()).filter_map(move |item| {
        match item {
            Ok(event) if wanted(&tables, &claims, &event) => match Event::default()
                .event(event.table.as_str())
                .json_data(&event)
            {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    tracing::warn!(error = %e, "could not encode change event");
                    None
                }
            },
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "change feed subscriber lagging, events dropped");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Empty set means every table
fn parse_tables(tables: Option<&str>) -> AppResult<HashSet<ChangeTable>> {
    tables
        .unwrap_or_default()
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.parse::<ChangeTable>().map_err(AppError::BadRequest))
        .collect()
}

/// Staff see every change; other users see the catalog, settings and their own rows
fn wanted(tables: &HashSet<ChangeTable>, claims: &UserClaims, event: &ChangeEvent) -> bool {
    if !tables.is_empty() && !tables.contains(&event.table) {
        return false;
    }
    if claims.role.is_staff() {
        return true;
    }

    let me = claims.user_id().to_string();
    match event.table {
        ChangeTable::Books | ChangeTable::Categories | ChangeTable::Settings => true,
        ChangeTable::Profiles => event.id == me,
        ChangeTable::Borrowings => event
            .record
            .as_ref()
            .and_then(|r| r.get("user_id"))
            .and_then(|v| v.as_str())
            .is_some_and(|owner| owner == me),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        borrowing::{BorrowingRecord, BorrowingStatus},
        event::ChangeAction,
        user::Role,
    };
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_parse_tables() {
        assert!(parse_tables(None).unwrap().is_empty());
        let tables = parse_tables(Some("books, borrowings")).unwrap();
        assert!(tables.contains(&ChangeTable::Books));
        assert!(tables.contains(&ChangeTable::Borrowings));
        assert!(matches!(parse_tables(Some("books,loans")), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_students_see_only_their_rows() {
        let me = Uuid::new_v4();
        let student = UserClaims::new(me, Role::Student, 1);
        let all = HashSet::new();

        let mine = ChangeEvent::new(
            ChangeTable::Borrowings,
            ChangeAction::Insert,
            Uuid::new_v4(),
            Some(&json!({"user_id": me.to_string()})),
        );
        let theirs = ChangeEvent::new(
            ChangeTable::Borrowings,
            ChangeAction::Insert,
            Uuid::new_v4(),
            Some(&json!({"user_id": Uuid::new_v4().to_string()})),
        );
        let book = ChangeEvent::deleted(ChangeTable::Books, Uuid::new_v4());

        assert!(wanted(&all, &student, &mine));
        assert!(!wanted(&all, &student, &theirs));
        assert!(wanted(&all, &student, &book));

        let teacher = UserClaims::new(Uuid::new_v4(), Role::Teacher, 1);
        assert!(wanted(&all, &teacher, &theirs));
    }

    #[test]
    fn test_students_see_their_loans_turn_overdue() {
        let me = Uuid::new_v4();
        let now = chrono::Utc::now();
        let record = BorrowingRecord {
            id: Uuid::new_v4(),
            user_id: me,
            book_id: Uuid::new_v4(),
            borrowed_at: now - chrono::Duration::days(30),
            due_date: now - chrono::Duration::days(16),
            returned_at: None,
            status: BorrowingStatus::Overdue,
            renewal_count: 0,
            fine_amount: rust_decimal::Decimal::ZERO,
            fine_paid: false,
            notes: None,
        };
        let event = ChangeEvent::new(ChangeTable::Borrowings, ChangeAction::Update, record.id, Some(&record));

        let owner = UserClaims::new(me, Role::Student, 1);
        let classmate = UserClaims::new(Uuid::new_v4(), Role::Student, 1);
        assert!(wanted(&HashSet::new(), &owner, &event));
        assert!(!wanted(&HashSet::new(), &classmate, &event));
    }

    #[test]
    fn test_table_filter() {
        let admin = UserClaims::new(Uuid::new_v4(), Role::Admin, 1);
        let only_books: HashSet<_> = [ChangeTable::Books].into_iter().collect();
        assert!(wanted(&only_books, &admin, &ChangeEvent::deleted(ChangeTable::Books, 1)));
        assert!(!wanted(&only_books, &admin, &ChangeEvent::deleted(ChangeTable::Categories, 1)));
    }
}
