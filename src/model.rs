//! Wire and domain types for the place-name registry.
//!
//! The directory service is loose about types: numbers arrive as integers,
//! floats or strings, and list fields are frequently `null`. Everything here
//! deserializes leniently so that a malformed field degrades to "absent"
//! instead of failing the whole record.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Summary-level entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub sys_id: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name_vn: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name_tr: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name_alt: Option<String>,
    #[serde(deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub spellings: Vec<Spelling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<FeatureType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<YearRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial: Option<RecordSpatial>,
}

impl Record {
    /// The cache and lookup key; blank identifiers count as missing.
    pub fn key(&self) -> Option<&str> {
        self.sys_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn present_locations(&self) -> &[PresentLocation] {
        self.spatial
            .as_ref()
            .map(|spatial| spatial.present_location.as_slice())
            .unwrap_or(&[])
    }

    /// Short label used in status messages.
    pub fn display_label(&self) -> &str {
        self.name_vn
            .as_deref()
            .or(self.name_en.as_deref())
            .or(self.sys_id.as_deref())
            .unwrap_or("record")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureType {
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name_vn: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
}

impl FeatureType {
    pub fn label(&self) -> Option<&str> {
        self.name_vn.as_deref().or(self.name_en.as_deref())
    }
}

/// Begin/end years; negative values are years before the common era.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YearRange {
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub beg_yr: Option<i64>,
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub end_yr: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordSpatial {
    #[serde(deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub present_location: Vec<PresentLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresentLocation {
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub text_value: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Spelling {
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub written_form: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub exonym_lang: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub attested_by: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A reference from one detail to another registry entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Relation {
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub sys_id: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub beg_yr: Option<i64>,
    #[serde(deserialize_with = "lenient_int", skip_serializing_if = "Option::is_none")]
    pub end_yr: Option<i64>,
}

impl Relation {
    pub fn years(&self) -> YearRange {
        YearRange {
            beg_yr: self.beg_yr,
            end_yr: self.end_yr,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoricalContext {
    #[serde(deserialize_with = "null_default")]
    pub part_of: Vec<Relation>,
    #[serde(deserialize_with = "null_default")]
    pub subordinate_units: Vec<Relation>,
    #[serde(deserialize_with = "null_default")]
    pub preceded_by: Vec<Relation>,
    #[serde(deserialize_with = "null_default")]
    pub later: Vec<Relation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetailSpatial {
    #[serde(deserialize_with = "lenient_text")]
    pub obj_type: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub present_location: Vec<PresentLocation>,
    #[serde(deserialize_with = "lenient_text")]
    pub source: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub xcoord: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub ycoord: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub xy_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DetailFields {
    #[serde(deserialize_with = "lenient_int")]
    id: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    sys_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    name_vn: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    name_en: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    name_tr: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    name_alt: Option<String>,
    #[serde(deserialize_with = "null_default")]
    spellings: Vec<Spelling>,
    feature_type: Option<FeatureType>,
    temporal: Option<YearRange>,
    spatial: Option<DetailSpatial>,
    #[serde(deserialize_with = "lenient_text")]
    data_src: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    data_source: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    source_note: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    source_uri: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    license: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    reason: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    reason2: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    check_status: Option<i64>,
    historical_context: Option<HistoricalContext>,
}

/// Full registry entry: provenance, spellings and historical relations.
///
/// The JSON document received from the service is retained verbatim so the
/// raw display mode shows exactly what was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    pub id: Option<i64>,
    pub sys_id: Option<String>,
    pub name_vn: Option<String>,
    pub name_en: Option<String>,
    pub name_tr: Option<String>,
    pub name_alt: Option<String>,
    pub spellings: Vec<Spelling>,
    pub feature_type: Option<FeatureType>,
    pub temporal: Option<YearRange>,
    pub spatial: Option<DetailSpatial>,
    pub data_src: Option<String>,
    pub data_source: Option<String>,
    pub source_note: Option<String>,
    pub source_uri: Option<String>,
    pub license: Option<String>,
    /// Reason the entry was rejected in review.
    pub reason: Option<String>,
    /// Reason the entry was disabled.
    pub reason2: Option<String>,
    pub check_status: Option<i64>,
    pub historical_context: HistoricalContext,
    raw: Value,
}

impl Detail {
    pub fn from_json(raw: Value) -> Result<Self, serde_json::Error> {
        let fields = DetailFields::deserialize(&raw)?;
        Ok(Self {
            id: fields.id,
            sys_id: fields.sys_id,
            name_vn: fields.name_vn,
            name_en: fields.name_en,
            name_tr: fields.name_tr,
            name_alt: fields.name_alt,
            spellings: fields.spellings,
            feature_type: fields.feature_type,
            temporal: fields.temporal,
            spatial: fields.spatial,
            data_src: fields.data_src,
            data_source: fields.data_source,
            source_note: fields.source_note,
            source_uri: fields.source_uri,
            license: fields.license,
            reason: fields.reason,
            reason2: fields.reason2,
            check_status: fields.check_status,
            historical_context: fields.historical_context.unwrap_or_default(),
            raw,
        })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn present_locations(&self) -> &[PresentLocation] {
        self.spatial
            .as_ref()
            .map(|spatial| spatial.present_location.as_slice())
            .unwrap_or(&[])
    }

    /// Projects the fields the results list needs. Used when a direct lookup
    /// has to be shown as a one-row result set.
    pub fn to_record(&self) -> Record {
        Record {
            id: self.id,
            sys_id: self.sys_id.clone(),
            name_vn: self.name_vn.clone(),
            name_en: self.name_en.clone(),
            name_tr: self.name_tr.clone(),
            name_alt: self.name_alt.clone(),
            spellings: self.spellings.clone(),
            feature_type: self.feature_type.clone(),
            temporal: self.temporal,
            spatial: self.spatial.as_ref().map(|spatial| RecordSpatial {
                present_location: spatial.present_location.clone(),
            }),
        }
    }
}

impl Serialize for Detail {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// Criteria submitted in criteria mode. Replaced wholesale on each submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub name: Option<String>,
    pub year: Option<i32>,
    /// Feature-type filter forwarded as `type`.
    pub kind: Option<String>,
}

/// Request body of the search endpoint. `page` is 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl SearchQuery {
    pub fn new(criteria: &SearchCriteria, page_index: u32, limit: u32) -> Self {
        Self {
            limit: Some(limit),
            name: criteria.name.clone(),
            page: Some(page_index.saturating_add(1)),
            kind: criteria.kind.clone(),
            year: criteria.year,
        }
    }
}

/// Response envelope of the search endpoint; a non-zero code is a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchEnvelope {
    #[serde(deserialize_with = "lenient_int")]
    pub resp_code: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    pub resp_msg: Option<String>,
    pub datas: Option<SearchPage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPage {
    #[serde(deserialize_with = "lenient_int")]
    pub total: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub size: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub pages: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub current: Option<i64>,
    #[serde(deserialize_with = "null_default")]
    pub records: Vec<Record>,
}

fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|n| n.is_finite())
                .map(|n| n.floor() as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_tolerates_nulls_and_loose_numbers() {
        let record: Record = serde_json::from_value(json!({
            "sysId": "PN-100",
            "nameVn": "Hanoi",
            "spellings": null,
            "featureType": null,
            "temporal": {"begYr": "-206", "endYr": 220.0},
            "spatial": {"presentLocation": null}
        }))
        .unwrap();
        assert_eq!(record.key(), Some("PN-100"));
        assert!(record.spellings.is_empty());
        assert_eq!(record.temporal.unwrap().beg_yr, Some(-206));
        assert_eq!(record.temporal.unwrap().end_yr, Some(220));
        assert!(record.present_locations().is_empty());
    }

    #[test]
    fn blank_sys_id_is_not_a_key() {
        let record = Record {
            sys_id: Some("   ".to_string()),
            ..Record::default()
        };
        assert_eq!(record.key(), None);
    }

    #[test]
    fn detail_keeps_raw_document_and_projects_record() {
        let raw = json!({
            "sysId": "PN-7",
            "nameVn": "Giao Chỉ",
            "license": "CC BY 4.0",
            "checkStatus": 1,
            "spatial": {"presentLocation": [{"textValue": "Hanoi", "countryCode": "vn"}], "xcoord": 105.8},
            "historicalContext": {"partOf": [{"sysId": "PN-1", "name": "Jiaozhou"}], "later": null},
            "unknownField": [1, 2, 3]
        });
        let detail = Detail::from_json(raw.clone()).unwrap();
        assert_eq!(detail.raw(), &raw);
        assert_eq!(serde_json::to_value(&detail).unwrap(), raw);
        assert_eq!(detail.historical_context.part_of.len(), 1);
        assert!(detail.historical_context.later.is_empty());
        assert_eq!(detail.spatial.as_ref().unwrap().xcoord.as_deref(), Some("105.8"));

        let record = detail.to_record();
        assert_eq!(record.key(), Some("PN-7"));
        assert_eq!(record.present_locations().len(), 1);
    }

    #[test]
    fn query_omits_unset_fields_and_uses_one_based_pages() {
        let criteria = SearchCriteria {
            name: Some("Hanoi".to_string()),
            year: None,
            kind: None,
        };
        let payload = serde_json::to_value(SearchQuery::new(&criteria, 0, 10)).unwrap();
        assert_eq!(payload, json!({"limit": 10, "name": "Hanoi", "page": 1}));
    }

    #[test]
    fn envelope_parses_page_metadata() {
        let envelope: SearchEnvelope = serde_json::from_value(json!({
            "resp_code": 0,
            "resp_msg": "ok",
            "datas": {"total": 23, "size": 10, "pages": 3, "current": 1, "records": [{"sysId": "A"}]}
        }))
        .unwrap();
        let page = envelope.datas.unwrap();
        assert_eq!(page.total, Some(23));
        assert_eq!(page.current, Some(1));
        assert_eq!(page.records.len(), 1);
    }
}
