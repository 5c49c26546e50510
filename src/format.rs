//! Display-oriented projections of records and details.
//!
//! Nothing here touches session state; every front-end renders through these
//! helpers so the terminal and JSON views agree on names, periods and labels.

use crate::model::{Detail, FeatureType, PresentLocation, Record, Relation, Spelling, YearRange};
use crate::view::DisplayMode;
use serde::Serialize;
use std::collections::BTreeSet;

pub const PLACEHOLDER: &str = "—";

/// Short year label; negative years are before the common era.
pub fn format_year(year: Option<i64>) -> Option<String> {
    match year? {
        year if year < 0 => Some(format!("{} BC", year.unsigned_abs())),
        year => Some(year.to_string()),
    }
}

pub fn format_period(range: Option<&YearRange>) -> String {
    let Some(range) = range else {
        return PLACEHOLDER.to_string();
    };
    match (format_year(range.beg_yr), format_year(range.end_yr)) {
        (Some(start), Some(end)) if start == end => start,
        (Some(start), Some(end)) => format!("{start} - {end}"),
        (Some(start), None) => format!("{start} onward"),
        (None, Some(end)) => format!("until {end}"),
        (None, None) => PLACEHOLDER.to_string(),
    }
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameVariants {
    pub simplified: String,
    pub traditional: String,
    pub romanized: String,
}

fn mentions(value: Option<&str>, needles: &[&str]) -> bool {
    value.is_some_and(|text| {
        let lower = text.to_lowercase();
        needles.iter().any(|needle| lower.contains(needle))
    })
}

fn pick_spelling<'a, P>(spellings: &[&'a Spelling], predicate: P) -> Option<&'a str>
where
    P: Fn(&Spelling) -> bool,
{
    spellings
        .iter()
        .copied()
        .find(|&entry| predicate(entry))
        .and_then(|entry| clean(entry.written_form.as_deref()))
}

/// Picks simplified, traditional and romanized names from the spelling
/// list, falling back to the record's own name fields.
pub fn name_variants(record: &Record, detail: Option<&Detail>) -> NameVariants {
    let spellings: Vec<&Spelling> = detail
        .map(|detail| detail.spellings.iter())
        .into_iter()
        .flatten()
        .chain(record.spellings.iter())
        .collect();

    let simplified = pick_spelling(&spellings, |entry| {
        mentions(entry.script.as_deref(), &["简体", "simplified", "hans"])
            || mentions(entry.note.as_deref(), &["简体", "简化"])
    });
    let traditional = pick_spelling(&spellings, |entry| {
        mentions(entry.script.as_deref(), &["繁体", "traditional", "hant"])
            || mentions(entry.note.as_deref(), &["繁体", "繁體"])
    });
    let romanized = pick_spelling(&spellings, |entry| {
        mentions(entry.script.as_deref(), &["拼音", "pinyin"])
            || mentions(entry.exonym_lang.as_deref(), &["拼音", "pinyin"])
            || mentions(entry.note.as_deref(), &["拼音"])
    });

    let detail_name_vn = detail.and_then(|detail| clean(detail.name_vn.as_deref()));
    let detail_name_en = detail.and_then(|detail| clean(detail.name_en.as_deref()));
    let detail_name_tr = detail.and_then(|detail| clean(detail.name_tr.as_deref()));

    NameVariants {
        simplified: simplified
            .or(detail_name_vn)
            .or(clean(record.name_vn.as_deref()))
            .or(detail_name_en)
            .or(clean(record.name_en.as_deref()))
            .or(detail.and_then(|detail| clean(detail.sys_id.as_deref())))
            .or(record.key())
            .unwrap_or(PLACEHOLDER)
            .to_string(),
        traditional: traditional
            .or(detail_name_en)
            .or(clean(record.name_en.as_deref()))
            .unwrap_or(PLACEHOLDER)
            .to_string(),
        romanized: romanized
            .or(detail_name_tr)
            .or(clean(record.name_tr.as_deref()))
            .unwrap_or(PLACEHOLDER)
            .to_string(),
    }
}

/// Display name for a results row or a detail heading.
pub fn primary_name(record: &Record, detail: Option<&Detail>) -> String {
    let name = name_variants(record, detail).simplified;
    if name == PLACEHOLDER {
        "Unnamed".to_string()
    } else {
        name
    }
}

/// Distinct present-day locations joined with " / ". Prefers the detail's
/// locations when a detail is given.
pub fn location_summary(record: &Record, detail: Option<&Detail>) -> Option<String> {
    let locations = match detail {
        Some(detail) if !detail.present_locations().is_empty() => detail.present_locations(),
        _ => record.present_locations(),
    };
    let mut seen = BTreeSet::new();
    let unique: Vec<&str> = locations
        .iter()
        .filter_map(|location| clean(location.text_value.as_deref()))
        .filter(|text| seen.insert(*text))
        .collect();
    if unique.is_empty() {
        None
    } else {
        Some(unique.join(" / "))
    }
}

pub fn feature_type_label(record: &Record) -> String {
    type_label(record.feature_type.as_ref())
}

fn type_label(kind: Option<&FeatureType>) -> String {
    kind.and_then(FeatureType::label)
        .and_then(|label| clean(Some(label)))
        .unwrap_or("Unknown")
        .to_string()
}

pub fn review_status_label(code: i64) -> String {
    match code {
        0 => "pending review".to_string(),
        1 => "approved".to_string(),
        2 => "rejected".to_string(),
        other => other.to_string(),
    }
}

/// Plain text of an HTML source note: tags dropped, common entities decoded,
/// whitespace collapsed.
pub fn source_note_text(markup: Option<&str>) -> Option<String> {
    let markup = markup?;
    let mut text = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ => text.push(ch),
        }
    }
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

pub fn raw_json(detail: &Detail) -> String {
    serde_json::to_string_pretty(detail.raw()).unwrap_or_else(|_| detail.raw().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationLine {
    pub label: String,
    pub sys_id: Option<String>,
    pub script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationSection {
    pub title: &'static str,
    pub entries: Vec<RelationLine>,
}

fn relation_section(title: &'static str, relations: &[Relation]) -> RelationSection {
    let entries = relations
        .iter()
        .filter(|relation| {
            clean(relation.name.as_deref()).is_some()
                || clean(relation.script.as_deref()).is_some()
                || clean(relation.sys_id.as_deref()).is_some()
        })
        .map(|relation| {
            let base = clean(relation.name.as_deref())
                .or(clean(relation.sys_id.as_deref()))
                .unwrap_or(PLACEHOLDER);
            let period = format_period(Some(&relation.years()));
            let label = if period == PLACEHOLDER {
                base.to_string()
            } else {
                format!("{base} ({period})")
            };
            RelationLine {
                label,
                sys_id: clean(relation.sys_id.as_deref()).map(str::to_string),
                script: clean(relation.script.as_deref()).map(str::to_string),
            }
        })
        .collect();
    RelationSection { title, entries }
}

fn location_line(location: &PresentLocation) -> Option<String> {
    let country = clean(location.country_code.as_deref()).map(str::to_uppercase);
    let name = clean(location.text_value.as_deref()).map(str::to_string);
    let parts: Vec<String> = country.into_iter().chain(name).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" · "))
    }
}

/// Everything the summary display mode shows for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub title: String,
    pub sys_id: Option<String>,
    pub feature_type: String,
    pub period: String,
    pub review_status: Option<String>,
    pub data_source: Option<String>,
    pub spatial_source: Option<String>,
    pub license: Option<String>,
    pub source_uri: Option<String>,
    pub rejection_reason: Option<String>,
    pub disabled_reason: Option<String>,
    pub names: NameVariants,
    pub locations: Vec<String>,
    pub coordinates: Option<String>,
    pub relations: Vec<RelationSection>,
}

impl SummaryView {
    pub fn build(record: &Record, detail: &Detail) -> Self {
        let names = name_variants(record, Some(detail));
        let sys_id = clean(detail.sys_id.as_deref())
            .or(record.key())
            .map(str::to_string);
        let title = if names.simplified != PLACEHOLDER {
            names.simplified.clone()
        } else {
            sys_id.clone().unwrap_or_else(|| "Unnamed".to_string())
        };
        let data_source = [detail.data_src.as_deref(), detail.data_source.as_deref()]
            .into_iter()
            .filter_map(clean)
            .collect::<Vec<_>>()
            .join(" · ");
        let spatial = detail.spatial.as_ref();
        let coordinates = {
            let x = spatial.and_then(|spatial| clean(spatial.xcoord.as_deref()));
            let y = spatial.and_then(|spatial| clean(spatial.ycoord.as_deref()));
            let parts: Vec<String> = x
                .map(|x| format!("lon {x}"))
                .into_iter()
                .chain(y.map(|y| format!("lat {y}")))
                .collect();
            (!parts.is_empty()).then(|| parts.join(" · "))
        };
        let context = &detail.historical_context;

        Self {
            title,
            sys_id,
            feature_type: type_label(detail.feature_type.as_ref().or(record.feature_type.as_ref())),
            period: format_period(detail.temporal.as_ref().or(record.temporal.as_ref())),
            review_status: detail.check_status.map(review_status_label),
            data_source: (!data_source.is_empty()).then_some(data_source),
            spatial_source: spatial
                .and_then(|spatial| clean(spatial.source.as_deref()))
                .map(str::to_string),
            license: clean(detail.license.as_deref()).map(str::to_string),
            source_uri: clean(detail.source_uri.as_deref()).map(str::to_string),
            rejection_reason: clean(detail.reason.as_deref()).map(str::to_string),
            disabled_reason: clean(detail.reason2.as_deref()).map(str::to_string),
            names,
            locations: detail
                .present_locations()
                .iter()
                .filter_map(location_line)
                .collect(),
            coordinates,
            relations: vec![
                relation_section("Part of", &context.part_of),
                relation_section("Subordinate units", &context.subordinate_units),
                relation_section("Preceded by", &context.preceded_by),
                relation_section("Followed by", &context.later),
            ],
        }
    }
}

/// Rendered content of one display mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "content")]
pub enum PanelContent {
    Summary(Box<SummaryView>),
    SourceNote(Option<String>),
    Raw(String),
}

impl PanelContent {
    pub fn render(mode: DisplayMode, record: &Record, detail: &Detail) -> Self {
        match mode {
            DisplayMode::Summary => PanelContent::Summary(Box::new(SummaryView::build(record, detail))),
            DisplayMode::SourceNote => {
                PanelContent::SourceNote(source_note_text(detail.source_note.as_deref()))
            }
            DisplayMode::Raw => PanelContent::Raw(raw_json(detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail() -> Detail {
        Detail::from_json(json!({
            "sysId": "PN-42",
            "nameVn": "交州",
            "nameEn": "Jiaozhou",
            "spellings": [
                {"writtenForm": "交州", "script": "Hans"},
                {"writtenForm": "交州", "script": "Hant"},
                {"writtenForm": "Jiaozhou", "exonymLang": "pinyin"}
            ],
            "temporal": {"begYr": -111, "endYr": 544},
            "spatial": {
                "presentLocation": [
                    {"textValue": "Hanoi", "countryCode": "vn"},
                    {"textValue": "Hanoi"},
                    {"textValue": "Bac Ninh", "countryCode": "vn"}
                ],
                "xcoord": "105.85",
                "ycoord": "21.03"
            },
            "checkStatus": 1,
            "dataSrc": "CHGIS",
            "license": "CC BY 4.0",
            "sourceNote": "<p>Seat moved in&nbsp;<b>226</b> &amp; later.</p>",
            "historicalContext": {
                "partOf": [{"sysId": "PN-1", "name": "Han", "begYr": -202, "endYr": 220}],
                "later": [{"sysId": "PN-99"}, {}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn years_and_periods() {
        assert_eq!(format_year(Some(-206)).as_deref(), Some("206 BC"));
        assert_eq!(format_year(Some(0)).as_deref(), Some("0"));
        assert_eq!(format_year(None), None);
        let range = YearRange {
            beg_yr: Some(-111),
            end_yr: Some(544),
        };
        assert_eq!(format_period(Some(&range)), "111 BC - 544");
        let same = YearRange {
            beg_yr: Some(618),
            end_yr: Some(618),
        };
        assert_eq!(format_period(Some(&same)), "618");
        let open = YearRange {
            beg_yr: Some(618),
            end_yr: None,
        };
        assert_eq!(format_period(Some(&open)), "618 onward");
        assert_eq!(format_period(None), PLACEHOLDER);
    }

    #[test]
    fn names_prefer_tagged_spellings() {
        let detail = detail();
        let names = name_variants(&detail.to_record(), Some(&detail));
        assert_eq!(names.simplified, "交州");
        assert_eq!(names.traditional, "交州");
        assert_eq!(names.romanized, "Jiaozhou");

        let bare = Record {
            sys_id: Some("PN-5".to_string()),
            ..Record::default()
        };
        let names = name_variants(&bare, None);
        assert_eq!(names.simplified, "PN-5");
        assert_eq!(names.traditional, PLACEHOLDER);
        assert_eq!(primary_name(&Record::default(), None), "Unnamed");
    }

    #[test]
    fn locations_are_deduplicated() {
        let detail = detail();
        assert_eq!(
            location_summary(&Record::default(), Some(&detail)).as_deref(),
            Some("Hanoi / Bac Ninh")
        );
        assert_eq!(location_summary(&Record::default(), None), None);
    }

    #[test]
    fn source_note_markup_is_flattened() {
        assert_eq!(
            source_note_text(Some("<p>Seat moved in&nbsp;<b>226</b> &amp; later.</p>")).as_deref(),
            Some("Seat moved in 226 & later.")
        );
        assert_eq!(source_note_text(Some("<br/>  ")), None);
        assert_eq!(source_note_text(None), None);
    }

    #[test]
    fn summary_collects_provenance_and_relations() {
        let detail = detail();
        let summary = SummaryView::build(&detail.to_record(), &detail);
        assert_eq!(summary.title, "交州");
        assert_eq!(summary.sys_id.as_deref(), Some("PN-42"));
        assert_eq!(summary.review_status.as_deref(), Some("approved"));
        assert_eq!(summary.data_source.as_deref(), Some("CHGIS"));
        assert_eq!(summary.coordinates.as_deref(), Some("lon 105.85 · lat 21.03"));
        assert_eq!(summary.locations, vec!["VN · Hanoi", "Hanoi", "VN · Bac Ninh"]);
        assert_eq!(summary.relations.len(), 4);
        assert_eq!(summary.relations[0].entries[0].label, "Han (202 BC - 220)");
        assert_eq!(summary.relations[3].entries.len(), 1);
        assert_eq!(summary.relations[3].entries[0].label, "PN-99");
    }

    #[test]
    fn raw_panel_is_the_fetched_document() {
        let detail = detail();
        let PanelContent::Raw(text) = PanelContent::render(DisplayMode::Raw, &detail.to_record(), &detail)
        else {
            panic!("expected raw content");
        };
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(&parsed, detail.raw());
    }
}
