//! Catalog search: query parsing, filtering, sorting, and pagination.
//!
//! Query values arrive as raw strings. An empty value counts as absent.
//! Page numbers are 1-based; unparseable or zero `page`/`limit` fall back to
//! the defaults, and `limit` is capped at [`MAX_PAGE_LIMIT`].

use crate::errors::TicketError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::models::EventListing;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Raw `GET /api/v1/events` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub city: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// Minor units, like `unit_price_cents`.
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Date,
    Price,
    Name,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Parsed catalog filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilters {
    /// Lowercased; matched against name, description and venue.
    pub search: Option<String>,
    pub event_type: Option<String>,
    pub city: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub price_min: Option<u64>,
    pub price_max: Option<u64>,
    pub page: usize,
    pub limit: usize,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl Default for EventFilters {
    fn default() -> Self {
        Self {
            search: None,
            event_type: None,
            city: None,
            status: None,
            date_from: None,
            date_to: None,
            price_min: None,
            price_max: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort: SortKey::default(),
            order: SortOrder::default(),
        }
    }
}

/// One page of catalog results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventPage {
    pub events: Vec<EventListing>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(key: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, TicketError> {
    present(value)
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|_| {
                    TicketError::Validation(format!(
                        "Invalid {key} format. Use RFC3339 format (e.g., 2025-07-15T00:00:00Z)"
                    ))
                })
        })
        .transpose()
}

/// Negative prices clamp to zero.
fn parse_price(key: &str, value: Option<String>) -> Result<Option<u64>, TicketError> {
    present(value)
        .map(|raw| {
            raw.parse::<i64>()
                .map(|p| u64::try_from(p).unwrap_or(0))
                .map_err(|_| TicketError::Validation(format!("Invalid {key} value. Must be a number.")))
        })
        .transpose()
}

fn parse_count(value: Option<String>, default: usize) -> usize {
    present(value)
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

fn equals_ignore_case(filter: Option<&String>, value: &str) -> bool {
    match filter {
        Some(f) => f.eq_ignore_ascii_case(value),
        None => true,
    }
}

impl EventFilters {
    /// # Errors
    ///
    /// `Validation` for a malformed date or price, or an unknown `sort` or
    /// `order` value.
    pub fn from_query(query: EventQuery) -> Result<Self, TicketError> {
        let sort = match present(query.sort).map(|s| s.to_ascii_lowercase()).as_deref() {
            None | Some("date") => SortKey::Date,
            Some("price") => SortKey::Price,
            Some("name") => SortKey::Name,
            Some("created_at") => SortKey::CreatedAt,
            Some(other) => {
                return Err(TicketError::Validation(format!("Invalid sort field: {other}")))
            }
        };
        let order = match present(query.order).map(|o| o.to_ascii_lowercase()).as_deref() {
            None | Some("asc") => SortOrder::Asc,
            Some("desc") => SortOrder::Desc,
            Some(other) => {
                return Err(TicketError::Validation(format!("Invalid sort order: {other}")))
            }
        };

        Ok(Self {
            search: present(query.search).map(|s| s.to_lowercase()),
            event_type: present(query.event_type),
            city: present(query.city),
            status: present(query.status),
            date_from: parse_date("date_from", query.date_from)?,
            date_to: parse_date("date_to", query.date_to)?,
            price_min: parse_price("price_min", query.price_min)?,
            price_max: parse_price("price_max", query.price_max)?,
            page: parse_count(query.page, 1),
            limit: parse_count(query.limit, DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT),
            sort,
            order,
        })
    }

    /// Date bounds are inclusive. An event without a start time never
    /// matches a date bound.
    #[must_use]
    pub fn matches(&self, listing: &EventListing) -> bool {
        let event = &listing.event;

        if let Some(needle) = &self.search {
            let hit = [&event.name, &event.description, &event.venue]
                .iter()
                .any(|field| field.to_lowercase().contains(needle));
            if !hit {
                return false;
            }
        }
        if !equals_ignore_case(self.event_type.as_ref(), &event.event_type)
            || !equals_ignore_case(self.city.as_ref(), &event.city)
            || !equals_ignore_case(self.status.as_ref(), event.status.as_str())
        {
            return false;
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(starts_at) = event.starts_at else {
                return false;
            };
            if self.date_from.is_some_and(|from| starts_at < from)
                || self.date_to.is_some_and(|to| starts_at > to)
            {
                return false;
            }
        }

        let price = event.unit_price_cents;
        !(self.price_min.is_some_and(|min| price < min)
            || self.price_max.is_some_and(|max| price > max))
    }

    fn compare(&self, a: &EventListing, b: &EventListing) -> Ordering {
        let (a, b) = (&a.event, &b.event);
        let ordered = |ordering: Ordering| match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };

        let primary = match self.sort {
            // Undated events sort last in either direction.
            SortKey::Date => match (a.starts_at, b.starts_at) {
                (Some(x), Some(y)) => ordered(x.cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            SortKey::Price => ordered(a.unit_price_cents.cmp(&b.unit_price_cents)),
            SortKey::Name => ordered(a.name.to_lowercase().cmp(&b.name.to_lowercase())),
            SortKey::CreatedAt => ordered(a.created_at.cmp(&b.created_at)),
        };
        primary.then(a.id.cmp(&b.id))
    }

    /// Filter, sort, and cut out the requested page.
    #[must_use]
    pub fn apply(&self, listings: Vec<EventListing>) -> EventPage {
        let mut matching: Vec<EventListing> =
            listings.into_iter().filter(|l| self.matches(l)).collect();
        matching.sort_by(|a, b| self.compare(a, b));

        let total = matching.len();
        let total_pages = total.div_ceil(self.limit);
        let offset = (self.page - 1).saturating_mul(self.limit);
        let events = matching.into_iter().skip(offset).take(self.limit).collect();

        EventPage {
            events,
            total,
            page: self.page,
            limit: self.limit,
            total_pages,
            has_next: self.page < total_pages,
            has_previous: self.page > 1,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::booking::models::{Event, EventStatus};
    use common::types::{EventId, SubjectId};

    fn listing(id: u64, name: &str, price: u64, starts_in_days: Option<i64>) -> EventListing {
        EventListing {
            event: Event {
                id: EventId(id),
                organizer_id: SubjectId(1),
                name: name.to_string(),
                description: String::new(),
                event_type: if id % 2 == 0 { "sports" } else { "concert" }.to_string(),
                status: EventStatus::Published,
                venue: "Arena".to_string(),
                city: if id <= 2 { "Austin" } else { "Denver" }.to_string(),
                address: String::new(),
                starts_at: starts_in_days.map(|d| Utc::now() + chrono::Duration::days(d)),
                capacity: 10,
                unit_price_cents: price,
                image_url: String::new(),
                created_at: Utc::now(),
            },
            available_tickets: 10,
        }
    }

    fn catalog() -> Vec<EventListing> {
        vec![
            listing(1, "Blues Night", 2_000, Some(3)),
            listing(2, "Derby Final", 5_000, Some(1)),
            listing(3, "Choir Evening", 1_000, None),
            listing(4, "Cup Match", 3_500, Some(10)),
        ]
    }

    fn query(pairs: &[(&str, &str)]) -> EventQuery {
        let object = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
            .collect();
        serde_json::from_value(serde_json::Value::Object(object)).unwrap()
    }

    fn ids(page: &EventPage) -> Vec<u64> {
        page.events.iter().map(|l| l.event.id.0).collect()
    }

    #[test]
    fn test_defaults() {
        let filters = EventFilters::from_query(EventQuery::default()).unwrap();
        assert_eq!(filters, EventFilters::default());

        let page = filters.apply(catalog());
        assert_eq!(ids(&page), vec![2, 1, 4, 3]);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 1);
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_text_and_attribute_filters() {
        let filters = EventFilters::from_query(query(&[("search", "NIGHT")])).unwrap();
        assert_eq!(ids(&filters.apply(catalog())), vec![1]);

        let filters =
            EventFilters::from_query(query(&[("type", "Sports"), ("city", "denver")])).unwrap();
        assert_eq!(ids(&filters.apply(catalog())), vec![4]);

        let filters = EventFilters::from_query(query(&[("status", "deleted")])).unwrap();
        assert!(filters.apply(catalog()).events.is_empty());
    }

    #[test]
    fn test_price_and_date_bounds() {
        let filters =
            EventFilters::from_query(query(&[("price_min", "2000"), ("price_max", "3500")]))
                .unwrap();
        assert_eq!(ids(&filters.apply(catalog())), vec![1, 4]);

        let filters = EventFilters::from_query(query(&[("price_min", "-50")])).unwrap();
        assert_eq!(filters.price_min, Some(0));

        let from = (Utc::now() + chrono::Duration::days(2)).to_rfc3339();
        let filters =
            EventFilters::from_query(query(&[("date_from", from.as_str())])).unwrap();
        // The undated event is excluded once a bound is set.
        assert_eq!(ids(&filters.apply(catalog())), vec![1, 4]);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        for pairs in [
            [("date_from", "next tuesday")],
            [("date_to", "2025-13-45")],
            [("price_min", "cheap")],
            [("sort", "popularity")],
            [("order", "sideways")],
        ] {
            let err = EventFilters::from_query(query(&pairs)).unwrap_err();
            assert!(matches!(err, TicketError::Validation(_)), "{pairs:?}");
        }

        let err = EventFilters::from_query(query(&[("date_to", "tomorrow")])).unwrap_err();
        assert_eq!(
            err.client_message(),
            "Invalid date_to format. Use RFC3339 format (e.g., 2025-07-15T00:00:00Z)"
        );
    }

    #[test]
    fn test_sorting() {
        let filters =
            EventFilters::from_query(query(&[("sort", "price"), ("order", "DESC")])).unwrap();
        assert_eq!(ids(&filters.apply(catalog())), vec![2, 4, 1, 3]);

        let filters = EventFilters::from_query(query(&[("sort", "name")])).unwrap();
        assert_eq!(ids(&filters.apply(catalog())), vec![1, 3, 4, 2]);

        let filters = EventFilters::from_query(query(&[("order", "desc")])).unwrap();
        assert_eq!(ids(&filters.apply(catalog())), vec![4, 1, 2, 3]);
    }

    #[test]
    fn test_pagination() {
        let filters = EventFilters::from_query(query(&[("limit", "3"), ("page", "2")])).unwrap();
        let page = filters.apply(catalog());
        assert_eq!(ids(&page), vec![3]);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        assert!(!page.has_next);
        assert!(page.has_previous);

        let filters = EventFilters::from_query(query(&[("limit", "3")])).unwrap();
        let page = filters.apply(catalog());
        assert_eq!(page.events.len(), 3);
        assert!(page.has_next);

        let filters = EventFilters::from_query(query(&[("page", "9")])).unwrap();
        assert!(filters.apply(catalog()).events.is_empty());
    }

    #[test]
    fn test_page_and_limit_fall_back_and_cap() {
        let filters =
            EventFilters::from_query(query(&[("page", "0"), ("limit", "abc")])).unwrap();
        assert_eq!(filters.page, 1);
        assert_eq!(filters.limit, DEFAULT_PAGE_LIMIT);

        let filters = EventFilters::from_query(query(&[("limit", "5000")])).unwrap();
        assert_eq!(filters.limit, MAX_PAGE_LIMIT);

        let empty = EventFilters::default().apply(Vec::new());
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }
}
