//! Keyset pagination over `(created_at, id)` in descending order.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::{Postgres, QueryBuilder};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_TAKE: i64 = 20;
pub const MAX_TAKE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Id of the row the page starts after (forward) or before (backward).
    pub cursor: Option<Uuid>,
    #[validate(range(min = 1, max = 100, message = "take must be between 1 and 100"))]
    pub take: Option<i64>,
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub cursor: Option<Uuid>,
    pub take: i64,
    pub direction: Direction,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            cursor: None,
            take: DEFAULT_TAKE,
            direction: Direction::Forward,
        }
    }
}

impl TryFrom<PageQuery> for PageParams {
    type Error = AppError;

    fn try_from(query: PageQuery) -> Result<Self, Self::Error> {
        query.validate()?;
        Ok(Self {
            cursor: query.cursor,
            take: query.take.unwrap_or(DEFAULT_TAKE),
            direction: query.direction.unwrap_or_default(),
        })
    }
}

impl PageParams {
    /// Appends the keyset condition, ordering and `LIMIT take + 1`. The
    /// builder must already hold a WHERE clause over `table`.
    pub fn push_keyset(&self, qb: &mut QueryBuilder<'_, Postgres>, table: &str) {
        let (cmp, order) = match self.direction {
            Direction::Forward => ("<", "DESC"),
            Direction::Backward => (">", "ASC"),
        };
        if let Some(cursor) = self.cursor {
            qb.push(format!(" AND (created_at, id) {} (SELECT created_at, id FROM {} WHERE id = ", cmp, table))
                .push_bind(cursor)
                .push(")");
        }
        qb.push(format!(" ORDER BY created_at {0}, id {0} LIMIT ", order))
            .push_bind(self.take + 1);
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T: Serialize> {
    pub data: Vec<T>,
    pub next_cursor: Option<Uuid>,
    pub prev_cursor: Option<Uuid>,
    pub has_more: bool,
}

impl<T: Serialize> Page<T> {
    /// Builds a page from up to `take + 1` rows fetched by [`PageParams::push_keyset`].
    /// Backward rows arrive oldest-first and are flipped back to display order.
    pub fn from_rows(mut rows: Vec<T>, params: &PageParams, id: impl Fn(&T) -> Uuid) -> Self {
        if params.direction == Direction::Backward {
            rows.reverse();
        }
        let take = params.take.max(0) as usize;
        let has_more = rows.len() > take;
        if has_more {
            match params.direction {
                Direction::Forward => rows.truncate(take),
                Direction::Backward => {
                    rows.drain(..rows.len() - take);
                }
            }
        }
        let next_cursor = match params.direction {
            Direction::Forward if has_more => rows.last().map(&id),
            _ => None,
        };
        let prev_cursor = match params.direction {
            Direction::Backward => rows.first().map(&id),
            Direction::Forward => None,
        };
        Self {
            data: rows,
            next_cursor,
            prev_cursor,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn defaults_and_bounds() {
        let params = PageParams::try_from(PageQuery::default()).unwrap();
        assert_eq!(params, PageParams::default());

        for bad in [0, 101, -5] {
            let query = PageQuery {
                take: Some(bad),
                ..Default::default()
            };
            assert!(PageParams::try_from(query).is_err());
        }
    }

    #[test]
    fn forward_trims_tail_and_sets_next_cursor() {
        let rows = ids(4);
        let params = PageParams {
            take: 3,
            ..Default::default()
        };
        let page = Page::from_rows(rows.clone(), &params, |id| *id);
        assert!(page.has_more);
        assert_eq!(page.data, rows[..3]);
        assert_eq!(page.next_cursor, Some(rows[2]));
        assert_eq!(page.prev_cursor, None);
    }

    #[test]
    fn forward_last_page_has_no_cursor() {
        let rows = ids(2);
        let page = Page::from_rows(rows, &PageParams::default(), |id| *id);
        assert!(!page.has_more);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn backward_trims_head_and_sets_prev_cursor() {
        // oldest-first as fetched: rows[0] is nearest the cursor
        let fetched = ids(4);
        let params = PageParams {
            cursor: Some(Uuid::new_v4()),
            take: 3,
            direction: Direction::Backward,
        };
        let page = Page::from_rows(fetched.clone(), &params, |id| *id);
        assert!(page.has_more);
        assert_eq!(page.data, vec![fetched[2], fetched[1], fetched[0]]);
        assert_eq!(page.prev_cursor, Some(fetched[2]));
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn keyset_sql_shape() {
        let params = PageParams {
            cursor: Some(Uuid::new_v4()),
            take: 10,
            direction: Direction::Forward,
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM leads WHERE deleted_at IS NULL");
        params.push_keyset(&mut qb, "leads");
        assert_eq!(
            qb.sql(),
            "SELECT * FROM leads WHERE deleted_at IS NULL AND (created_at, id) < \
             (SELECT created_at, id FROM leads WHERE id = $1) ORDER BY created_at DESC, id DESC LIMIT $2"
        );
    }
}
