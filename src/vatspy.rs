use std::{collections::BTreeMap, fmt::Display};

use chrono::{NaiveDate, Utc};
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, trace};

use super::read_to_string;

#[derive(Parser)]
#[grammar = "pest/vatspy.pest"]
pub struct VatSpyParser;

#[derive(Error, Debug)]
pub enum VatSpyError {
    /// The grammar accepts any text, so this is not expected in practice.
    #[error("failed to parse VATSpy.dat: {0}")]
    Parse(#[from] pest::error::Error<Rule>),
    #[error("line {line} in [{section}] has {found} fields, expected at least {expected}")]
    MissingFields {
        line: usize,
        section: Section,
        expected: usize,
        found: usize,
    },
}

/// Format version written into the `general` block of every document.
pub const FORMAT_VERSION: &str = "0.0.1";

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct General {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// UTC date of the conversion, serialized as `YYYYMMDD`
    #[serde(serialize_with = "serialize_date")]
    pub last_updated: NaiveDate,
    /// Release tag or AIRAC cycle of the source file
    pub vatspy_data: String,
}

fn serialize_date<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&date.format("%Y%m%d"))
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Country {
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub typ: String,
}

// coordinates stay textual, the source does not guarantee they are numbers
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Airport {
    pub icao: String,
    pub name: String,
    pub latitude: String,
    pub longitude: String,
    pub iata: String,
    pub fir: String,
    pub is_pseudo: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Fir {
    pub icao: String,
    pub name: String,
    pub callsign_prefix: String,
    pub fir_boundary: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Uir {
    pub prefix: String,
    pub name: String,
    pub coverage_firs: String,
}

/// One vertex of the international date line polyline
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct IdlPoint {
    pub cord1: String,
    pub cord2: String,
}

/// A record built positionally from the `|` separated fields of one line.
trait Record: Sized {
    const FIELDS: usize;

    /// `fields` holds at least `FIELDS` entries
    fn from_fields(fields: &[&str]) -> Self;
}

impl Record for Country {
    const FIELDS: usize = 3;

    fn from_fields(fields: &[&str]) -> Self {
        Self {
            name: fields[0].to_string(),
            code: fields[1].to_string(),
            typ: fields[2].to_string(),
        }
    }
}

impl Record for Airport {
    const FIELDS: usize = 7;

    fn from_fields(fields: &[&str]) -> Self {
        Self {
            icao: fields[0].to_string(),
            name: fields[1].to_string(),
            latitude: fields[2].to_string(),
            longitude: fields[3].to_string(),
            iata: fields[4].to_string(),
            fir: fields[5].to_string(),
            is_pseudo: fields[6].to_string(),
        }
    }
}

impl Record for Fir {
    const FIELDS: usize = 4;

    fn from_fields(fields: &[&str]) -> Self {
        Self {
            icao: fields[0].to_string(),
            name: fields[1].to_string(),
            callsign_prefix: fields[2].to_string(),
            fir_boundary: fields[3].to_string(),
        }
    }
}

impl Record for Uir {
    const FIELDS: usize = 3;

    fn from_fields(fields: &[&str]) -> Self {
        Self {
            prefix: fields[0].to_string(),
            name: fields[1].to_string(),
            coverage_firs: fields[2].to_string(),
        }
    }
}

impl Record for IdlPoint {
    const FIELDS: usize = 2;

    fn from_fields(fields: &[&str]) -> Self {
        Self {
            cord1: fields[0].to_string(),
            cord2: fields[1].to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Section {
    Countries,
    Airports,
    Firs,
    Uirs,
    Idl,
    /// Lines before the first header and lines of sections this converter
    /// does not know are dropped without error.
    Unknown(String),
}

impl From<&str> for Section {
    fn from(name: &str) -> Self {
        match name {
            "Countries" => Self::Countries,
            "Airports" => Self::Airports,
            "FIRs" => Self::Firs,
            "UIRs" => Self::Uirs,
            "IDL" => Self::Idl,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Countries => "Countries",
            Self::Airports => "Airports",
            Self::Firs => "FIRs",
            Self::Uirs => "UIRs",
            Self::Idl => "IDL",
            Self::Unknown(name) => name,
        })
    }
}

impl Section {
    /// Blank lines in `[Countries]` still take up a key, existing consumers
    /// of the JSON rely on these keys.
    fn counts_blank_lines(&self) -> bool {
        matches!(self, Self::Countries)
    }
}

/// Every section is keyed by its cursor, so keys can have gaps and a section
/// entered twice overwrites from key 0.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct VatSpy {
    pub general: General,
    pub countries: BTreeMap<usize, Country>,
    pub airports: BTreeMap<usize, Airport>,
    pub firs: BTreeMap<usize, Fir>,
    pub uirs: BTreeMap<usize, Uir>,
    pub idl: BTreeMap<usize, IdlPoint>,
}

pub type VatSpyResult = Result<VatSpy, VatSpyError>;

fn insert<R: Record>(
    records: &mut BTreeMap<usize, R>,
    cursor: usize,
    fields: &[&str],
    line: usize,
    section: &Section,
) -> Result<(), VatSpyError> {
    if fields.len() < R::FIELDS {
        return Err(VatSpyError::MissingFields {
            line,
            section: section.clone(),
            expected: R::FIELDS,
            found: fields.len(),
        });
    }
    records.insert(cursor, R::from_fields(fields));
    Ok(())
}

fn section_name<'i>(pair: Pair<'i, Rule>) -> &'i str {
    pair.into_inner()
        .find(|inner| matches!(inner.as_rule(), Rule::section_name))
        .map_or("", |name| name.as_str())
}

impl VatSpy {
    /// Parses the contents of a VATSpy.dat, stamping the document with today's
    /// UTC date and `version` as its source tag.
    pub fn parse(content: &[u8], version: &str) -> VatSpyResult {
        Self::parse_at(content, version, Utc::now().date_naive())
    }

    pub fn parse_at(content: &[u8], version: &str, generated: NaiveDate) -> VatSpyResult {
        let unparsed_file = read_to_string(content);
        let lines = VatSpyParser::parse(Rule::vatspy, &unparsed_file)?;

        let mut vatspy = VatSpy {
            general: General {
                version: Some(FORMAT_VERSION.to_string()),
                last_updated: generated,
                vatspy_data: version.to_string(),
            },
            countries: BTreeMap::new(),
            airports: BTreeMap::new(),
            firs: BTreeMap::new(),
            uirs: BTreeMap::new(),
            idl: BTreeMap::new(),
        };
        let mut section = Section::Unknown(String::new());
        let mut cursor = 0;

        // pest's line_col only counts `\n`, every pair but EOI is one line
        let lines = lines
            .flat_map(Pair::into_inner)
            .filter(|pair| pair.as_rule() != Rule::EOI);

        for (index, pair) in lines.enumerate() {
            let line = index + 1;
            match pair.as_rule() {
                Rule::header => {
                    section = Section::from(section_name(pair));
                    cursor = 0;
                    debug!("entering section [{section}]");
                }
                Rule::data => {
                    let fields = pair.as_str().trim().split('|').collect::<Vec<_>>();

                    if fields.len() == 1 {
                        if section.counts_blank_lines() {
                            cursor += 1;
                        }
                        continue;
                    }

                    let stored = match &section {
                        Section::Countries => {
                            insert(&mut vatspy.countries, cursor, &fields, line, &section)
                        }
                        Section::Airports => {
                            insert(&mut vatspy.airports, cursor, &fields, line, &section)
                        }
                        Section::Firs => insert(&mut vatspy.firs, cursor, &fields, line, &section),
                        Section::Uirs => insert(&mut vatspy.uirs, cursor, &fields, line, &section),
                        Section::Idl => insert(&mut vatspy.idl, cursor, &fields, line, &section),
                        Section::Unknown(_) => {
                            trace!("dropping line {line} of unknown section [{section}]");
                            continue;
                        }
                    };
                    stored?;
                    trace!("[{section}] {cursor}: {}", pair.as_str());
                    cursor += 1;
                }
                Rule::comment => (),
                rule => unreachable!("{rule:?}"),
            }
        }

        Ok(vatspy)
    }
}
