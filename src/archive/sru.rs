use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::warn;
use url::Url;

use crate::archive::{Archive, parse_endpoint};
use crate::constants::archive::{
    DEFAULT_SRU_ENDPOINT, SRU_COLLECTION, SRU_COUNT_ELEMENT, SRU_IDENTIFIER_ELEMENT,
    SRU_RECORD_ELEMENT, SRU_RECORD_SCHEMA, SRU_VERSION,
};
use crate::data::{RecordId, Split};
use crate::errors::SamplerError;

const SRU_ARCHIVE_ID: &str = "sru";
const SRU_RESPONSE_ELEMENT: &[u8] = b"srw:searchRetrieveResponse";

/// SRU 1.2 `searchRetrieve` archive returning Dublin Core records.
///
/// Pages are addressed with `startRecord` (1-based) and `maximumRecords`;
/// the match count comes from `srw:numberOfRecords` of a one-record request.
#[derive(Clone, Debug)]
pub struct SruArchive {
    endpoint: Url,
    collection: String,
}

impl SruArchive {
    /// Adapter for `endpoint`, querying the default collection.
    pub fn new(endpoint: &str) -> Result<Self, SamplerError> {
        Ok(Self {
            endpoint: parse_endpoint(SRU_ARCHIVE_ID, endpoint)?,
            collection: SRU_COLLECTION.to_string(),
        })
    }

    /// Query a different `x-collection`.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    fn search_url(&self, query: &str, start: usize, maximum: usize) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("version", SRU_VERSION)
            .append_pair("operation", "searchRetrieve")
            .append_pair("x-collection", &self.collection)
            .append_pair("recordSchema", SRU_RECORD_SCHEMA)
            .append_pair("startRecord", &start.to_string())
            .append_pair("maximumRecords", &maximum.to_string())
            .append_pair("query", query);
        url.into()
    }

    fn malformed(details: impl Into<String>) -> SamplerError {
        SamplerError::MalformedResponse {
            archive: SRU_ARCHIVE_ID.into(),
            details: details.into(),
        }
    }
}

impl Default for SruArchive {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_SRU_ENDPOINT).expect("default SRU endpoint is valid"),
            collection: SRU_COLLECTION.to_string(),
        }
    }
}

impl Archive for SruArchive {
    fn id(&self) -> &str {
        SRU_ARCHIVE_ID
    }

    fn count_url(&self, query: &str) -> String {
        self.search_url(query, 1, 1)
    }

    fn page_url(&self, split: &Split) -> String {
        self.search_url(&split.query, split.start, split.width)
    }

    fn parse_count(&self, body: &[u8]) -> Result<usize, SamplerError> {
        let mut reader = Reader::from_reader(body);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut in_count = false;
        loop {
            match reader.read_event_into(&mut buf) {
                Err(err) => return Err(Self::malformed(format!("invalid XML: {err}"))),
                Ok(Event::Eof) => break,
                Ok(Event::Start(element)) => {
                    in_count = element.name().as_ref() == SRU_COUNT_ELEMENT;
                }
                Ok(Event::End(_)) => in_count = false,
                Ok(Event::Text(text)) if in_count => {
                    let raw = text
                        .unescape()
                        .map_err(|err| Self::malformed(format!("invalid count text: {err}")))?;
                    return raw.trim().parse::<usize>().map_err(|err| {
                        Self::malformed(format!("numberOfRecords '{raw}' is not a count: {err}"))
                    });
                }
                Ok(_) => {}
            }
            buf.clear();
        }
        Err(Self::malformed("response has no srw:numberOfRecords"))
    }

    fn parse_page(&self, body: &[u8]) -> Result<Vec<RecordId>, SamplerError> {
        let mut reader = Reader::from_reader(body);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut saw_response = false;
        let mut in_record = false;
        let mut in_identifier = false;
        let mut current: Option<RecordId> = None;
        let mut skipped = 0usize;
        let mut ids = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Err(err) => return Err(Self::malformed(format!("invalid XML: {err}"))),
                Ok(Event::Eof) => break,
                Ok(Event::Start(element)) => match element.name().as_ref() {
                    SRU_RESPONSE_ELEMENT => saw_response = true,
                    SRU_RECORD_ELEMENT => {
                        in_record = true;
                        current = None;
                    }
                    SRU_IDENTIFIER_ELEMENT if in_record => in_identifier = true,
                    _ => {}
                },
                Ok(Event::End(element)) => match element.name().as_ref() {
                    SRU_RECORD_ELEMENT => {
                        in_record = false;
                        match current.take() {
                            Some(id) => ids.push(id),
                            None => skipped += 1,
                        }
                    }
                    SRU_IDENTIFIER_ELEMENT => in_identifier = false,
                    _ => {}
                },
                Ok(Event::Text(text)) if in_identifier && current.is_none() => {
                    let value = text.unescape().map_err(|err| {
                        Self::malformed(format!("invalid identifier text: {err}"))
                    })?;
                    let value = value.trim();
                    if !value.is_empty() {
                        current = Some(value.to_string());
                    }
                }
                Ok(_) => {}
            }
            buf.clear();
        }
        if !saw_response {
            return Err(Self::malformed("response is not an SRU searchRetrieveResponse"));
        }
        if skipped > 0 {
            warn!(
                skipped,
                kept = ids.len(),
                "[panning:sru] records without dc:identifier skipped"
            );
        }
        Ok(ids)
    }
}
