//! Query catalogue: the HTTP surface of the system under test.
//!
//! Each kind binds a stable identifier to a threshold category, an HTTP
//! method, a path template with one parameter slot, and a draw weight
//! within its top-level workload category.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level workload category used by mix patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopCategory {
    Lookup,
    Analytics,
    Write,
}

/// Threshold category for a query kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    IdentifierLookup,
    TwoHop,
    ThreeHop,
    SixHop,
    PropertyWrite,
    RelationshipWrite,
}

impl QueryCategory {
    pub fn top(self) -> TopCategory {
        match self {
            QueryCategory::IdentifierLookup => TopCategory::Lookup,
            QueryCategory::TwoHop | QueryCategory::ThreeHop | QueryCategory::SixHop => {
                TopCategory::Analytics
            }
            QueryCategory::PropertyWrite | QueryCategory::RelationshipWrite => TopCategory::Write,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryCategory::IdentifierLookup => "identifier_lookup",
            QueryCategory::TwoHop => "two_hop",
            QueryCategory::ThreeHop => "three_hop",
            QueryCategory::SixHop => "six_hop",
            QueryCategory::PropertyWrite => "property_write",
            QueryCategory::RelationshipWrite => "relationship_write",
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Which parameter pool fills the `{v}` slot (or the request body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSlot {
    AirIdentifier,
    SeaIdentifier,
    Country,
    WritePayload,
}

#[derive(Debug)]
pub struct QueryKind {
    pub id: &'static str,
    pub category: QueryCategory,
    pub method: HttpMethod,
    pub path: &'static str,
    pub slot: ParamSlot,
    /// Draw weight within the kind's top-level category.
    pub weight: u32,
}

/// The default catalogue.
///
/// Sub-weights: lookups split evenly between air and sea identifiers;
/// analytics draws 60% two-hop (split between the two two-hop kinds) and
/// 40% three-hop. There is no six-hop endpoint on the SUT surface, so the
/// six_hop threshold class is only reachable through ad-hoc kinds.
pub const CATALOG: &[QueryKind] = &[
    QueryKind {
        id: "mode_s",
        category: QueryCategory::IdentifierLookup,
        method: HttpMethod::Get,
        path: "/api/aircraft/mode_s/{v}",
        slot: ParamSlot::AirIdentifier,
        weight: 50,
    },
    QueryKind {
        id: "mmsi",
        category: QueryCategory::IdentifierLookup,
        method: HttpMethod::Get,
        path: "/api/ship/mmsi/{v}",
        slot: ParamSlot::SeaIdentifier,
        weight: 50,
    },
    QueryKind {
        id: "country_two_hop",
        category: QueryCategory::TwoHop,
        method: HttpMethod::Get,
        path: "/api/aircraft/country/{v}",
        slot: ParamSlot::Country,
        weight: 30,
    },
    QueryKind {
        id: "cross_domain",
        category: QueryCategory::ThreeHop,
        method: HttpMethod::Get,
        path: "/api/cross-domain/country/{v}",
        slot: ParamSlot::Country,
        weight: 40,
    },
    QueryKind {
        id: "activity_history",
        category: QueryCategory::TwoHop,
        method: HttpMethod::Get,
        path: "/api/activity/mmsi/{v}",
        slot: ParamSlot::SeaIdentifier,
        weight: 30,
    },
    QueryKind {
        id: "activity_log",
        category: QueryCategory::PropertyWrite,
        method: HttpMethod::Post,
        path: "/api/activity/log",
        slot: ParamSlot::WritePayload,
        weight: 100,
    },
];

pub fn kind(id: &str) -> Option<&'static QueryKind> {
    CATALOG.iter().find(|k| k.id == id)
}

pub fn category_of(id: &str) -> Option<QueryCategory> {
    kind(id).map(|k| k.category)
}

pub fn kinds_in(top: TopCategory) -> Vec<&'static QueryKind> {
    CATALOG.iter().filter(|k| k.category.top() == top).collect()
}
