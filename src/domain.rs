use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::MirrorError;

/// Which top-level collection a walk mirrors. Selects the local directory,
/// the primary descriptor file and how aggressively existing records are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Sample,
    Study,
}

impl EntityKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            EntityKind::Sample => "samples",
            EntityKind::Study => "studies",
        }
    }

    pub fn descriptor_name(self) -> &'static str {
        match self {
            EntityKind::Sample => "sample.json",
            EntityKind::Study => "study.json",
        }
    }

    /// Name of the endpoint in the API root document.
    pub fn endpoint_name(self) -> &'static str {
        self.dir_name()
    }

    /// Whether an existing descriptor short-circuits all work for the entity.
    pub fn skips_recorded(self) -> bool {
        matches!(self, EntityKind::Sample)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Sample => write!(f, "sample"),
            EntityKind::Study => write!(f, "study"),
        }
    }
}

/// Second relation materialized next to a study's analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StudyRelation {
    Samples,
    Biomes,
}

impl StudyRelation {
    pub fn relation(self) -> &'static str {
        match self {
            StudyRelation::Samples => "samples",
            StudyRelation::Biomes => "biomes",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            StudyRelation::Samples => "samples.json",
            StudyRelation::Biomes => "biomes.json",
        }
    }
}

impl fmt::Display for StudyRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.relation())
    }
}

impl FromStr for StudyRelation {
    type Err = MirrorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "samples" => Ok(StudyRelation::Samples),
            "biomes" => Ok(StudyRelation::Biomes),
            other => Err(MirrorError::InvalidConfig(format!(
                "unknown study relation `{other}` (expected samples or biomes)"
            ))),
        }
    }
}

/// How one run (and one analysis) is picked out of a related collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Index 0, trusting the server to list the latest first.
    #[default]
    First,
    /// Greatest timestamp found in `attributes.<name>`.
    NewestBy(String),
}

impl SelectionRule {
    pub fn select<'a>(&self, entities: &'a [Entity]) -> Option<&'a Entity> {
        match self {
            SelectionRule::First => entities.first(),
            SelectionRule::NewestBy(attribute) => {
                let mut best: Option<(&Entity, NaiveDateTime)> = None;
                for entity in entities {
                    let Some(stamp) = entity.attribute_str(attribute).and_then(parse_timestamp)
                    else {
                        continue;
                    };
                    if best.is_none_or(|(_, current)| stamp > current) {
                        best = Some((entity, stamp));
                    }
                }
                best.map(|(entity, _)| entity).or_else(|| entities.first())
            }
        }
    }
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionRule::First => write!(f, "first"),
            SelectionRule::NewestBy(attribute) => write!(f, "newest-by:{attribute}"),
        }
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// A JSON:API resource object, kept verbatim so it can be written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: String,
    raw: Value,
}

impl Entity {
    pub fn from_value(raw: Value) -> Result<Self, MirrorError> {
        let id = match raw.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(MirrorError::missing("resource object", "id")),
        };
        Ok(Self { id, raw })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.raw.get("attributes").and_then(|attrs| attrs.get(name))
    }

    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(Value::as_str)
    }

    /// Like [`Entity::attribute_str`], but an absent or non-string value is an error.
    pub fn require_attribute_str(&self, name: &str) -> Result<&str, MirrorError> {
        self.attribute_str(name).ok_or_else(|| {
            MirrorError::missing(format!("resource {}", self.id), format!("attributes.{name}"))
        })
    }

    /// `relationships.<name>.links.related`
    pub fn related_url(&self, relation: &str) -> Result<&str, MirrorError> {
        self.raw
            .get("relationships")
            .and_then(|rels| rels.get(relation))
            .and_then(|rel| rel.get("links"))
            .and_then(|links| links.get("related"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MirrorError::missing(
                    format!("resource {}", self.id),
                    format!("relationships.{relation}.links.related"),
                )
            })
    }

    /// `links.self`
    pub fn self_url(&self) -> Result<&str, MirrorError> {
        self.raw
            .get("links")
            .and_then(|links| links.get("self"))
            .and_then(Value::as_str)
            .ok_or_else(|| MirrorError::missing(format!("resource {}", self.id), "links.self"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    data: Vec<Value>,
    #[serde(default)]
    links: PageLinks,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    page: Option<u64>,
}

/// One page of a paginated collection; `next` is the cursor to the following page.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: Vec<Value>,
    pub next: Option<String>,
    pub number: Option<u64>,
}

impl Page {
    pub fn from_value(url: &str, value: Value) -> Result<Self, MirrorError> {
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|err| MirrorError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            data: envelope.data,
            next: envelope.links.next.filter(|next| !next.is_empty()),
            number: envelope
                .meta
                .and_then(|meta| meta.pagination)
                .and_then(|pagination| pagination.page),
        })
    }

    pub fn entities(&self) -> Result<Vec<Entity>, MirrorError> {
        self.data.iter().cloned().map(Entity::from_value).collect()
    }
}

/// A fully materialized relation: all pages' `data` concatenated in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub data: Vec<Value>,
}

impl Collection {
    pub fn entities(&self) -> Result<Vec<Entity>, MirrorError> {
        self.data.iter().cloned().map(Entity::from_value).collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_document(&self) -> Value {
        json!({ "data": self.data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(id: &str, time: Option<&str>) -> Entity {
        let attrs = match time {
            Some(time) => json!({ "complete-time": time }),
            None => json!({}),
        };
        Entity::from_value(json!({ "id": id, "attributes": attrs })).unwrap()
    }

    #[test]
    fn newest_by_picks_latest_timestamp() {
        let items = vec![
            analysis("MGYA1", Some("2019-01-01T10:00:00")),
            analysis("MGYA2", Some("2021-06-30T08:15:00")),
            analysis("MGYA3", None),
        ];
        let rule = SelectionRule::NewestBy("complete-time".to_string());
        assert_eq!(rule.select(&items).unwrap().id(), "MGYA2");
    }

    #[test]
    fn newest_by_falls_back_to_first() {
        let items = vec![analysis("MGYA1", None), analysis("MGYA2", Some("garbage"))];
        let rule = SelectionRule::NewestBy("complete-time".to_string());
        assert_eq!(rule.select(&items).unwrap().id(), "MGYA1");
        assert!(rule.select(&[]).is_none());
    }

    #[test]
    fn required_attribute_reports_missing_field() {
        let item = analysis("MGYA1", None);
        assert!(matches!(
            item.require_attribute_str("analysis-status"),
            Err(MirrorError::MissingField { ref field, .. }) if field == "attributes.analysis-status"
        ));
        let item = analysis("MGYA2", Some("2020-01-01"));
        assert_eq!(item.require_attribute_str("complete-time").unwrap(), "2020-01-01");
    }

    #[test]
    fn page_reads_cursor_and_number() {
        let page = Page::from_value(
            "http://api/samples",
            json!({
                "data": [{"id": "ERS1"}],
                "links": {"next": null},
                "meta": {"pagination": {"page": 3, "pages": 3}}
            }),
        )
        .unwrap();
        assert!(page.next.is_none());
        assert_eq!(page.number, Some(3));
        assert_eq!(page.entities().unwrap()[0].id(), "ERS1");
    }
}
