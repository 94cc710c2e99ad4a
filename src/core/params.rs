use crate::core::errors::{TwitterError, TwitterResult};
use crate::core::traits::{ParamEnum, ParamFlags, ToParameters};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use rust_decimal::Decimal;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;

/// Byte stream of unknown length used for chunked uploads
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Textual layout for date/time parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `yyyyMMddHHmm`, used by search-style filters
    Compact,
    /// `yyyy-MM-ddTHH:mm:ssZ`
    Iso,
    /// `yyyy-MM-dd`, used by `since`/`until`
    DateOnly,
}

impl DateFormat {
    fn pattern(self) -> &'static str {
        match self {
            Self::Compact => "%Y%m%d%H%M",
            Self::Iso => "%Y-%m-%dT%H:%M:%SZ",
            Self::DateOnly => "%Y-%m-%d",
        }
    }
}

/// Where the bytes of a binary parameter come from
pub enum MediaSource {
    Bytes(Bytes),
    File(PathBuf),
    Stream {
        stream: ByteStream,
        length: Option<u64>,
    },
}

/// Binary payload; its presence switches POST bodies to multipart
pub struct Media {
    pub file_name: Option<String>,
    pub source: MediaSource,
}

impl Media {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            file_name: None,
            source: MediaSource::Bytes(data.into()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self {
            file_name,
            source: MediaSource::File(path),
        }
    }

    /// A stream whose length may be unknown up front
    pub fn stream(stream: ByteStream, length: Option<u64>) -> Self {
        Self {
            file_name: None,
            source: MediaSource::Stream { stream, length },
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Length in bytes when it can be known without reading the source
    pub fn known_length(&self) -> Option<u64> {
        match &self.source {
            MediaSource::Bytes(bytes) => Some(bytes.len() as u64),
            MediaSource::File(_) => None,
            MediaSource::Stream { length, .. } => *length,
        }
    }
}

impl fmt::Debug for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            MediaSource::Bytes(b) => format!("Bytes({} bytes)", b.len()),
            MediaSource::File(p) => format!("File({})", p.display()),
            MediaSource::Stream { length, .. } => format!("Stream(length={:?})", length),
        };
        f.debug_struct("Media")
            .field("file_name", &self.file_name)
            .field("source", &source)
            .finish()
    }
}

/// A parameter value before it is rendered to text
#[derive(Debug)]
pub enum ParamValue {
    Text(String),
    Signed(i128),
    Unsigned(u128),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    Bool(bool),
    DateTime(DateTime<Utc>, DateFormat),
    /// Pre-rendered enum or flag names
    Name(String),
    List(Vec<ParamValue>),
    Media(Media),
}

impl ParamValue {
    pub fn date(value: DateTime<Utc>) -> Self {
        Self::DateTime(value, DateFormat::Compact)
    }

    pub fn iso_date(value: DateTime<Utc>) -> Self {
        Self::DateTime(value, DateFormat::Iso)
    }

    pub fn date_only(value: DateTime<Utc>) -> Self {
        Self::DateTime(value, DateFormat::DateOnly)
    }

    pub fn name<E: ParamEnum>(value: &E) -> Self {
        Self::Name(value.name().to_lowercase())
    }

    pub fn flags<F: ParamFlags>(value: &F) -> Self {
        Self::Name(value.active_names().join(","))
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ParamValue>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_media(&self) -> bool {
        matches!(self, Self::Media(_))
    }

    /// Wire text for this value; `None` for binary payloads
    pub fn render(&self) -> Option<String> {
        let text = match self {
            Self::Text(s) | Self::Name(s) => s.clone(),
            Self::Signed(n) => n.to_string(),
            Self::Unsigned(n) => n.to_string(),
            Self::Single(f) => render_float(f.to_string(), f.is_finite()),
            Self::Double(f) => render_float(f.to_string(), f.is_finite()),
            Self::Decimal(d) => render_decimal(*d),
            Self::Bool(b) => b.to_string(),
            Self::DateTime(dt, format) => dt.format(format.pattern()).to_string(),
            Self::List(items) => items
                .iter()
                .map(|item| item.render())
                .collect::<Option<Vec<_>>>()?
                .join(","),
            Self::Media(_) => return None,
        };
        Some(text)
    }

    fn contains_media(&self) -> bool {
        match self {
            Self::Media(_) => true,
            Self::List(items) => items.iter().any(|item| item.contains_media()),
            _ => false,
        }
    }
}

fn render_float(text: String, finite: bool) -> String {
    if finite && !text.contains('.') && !text.contains('e') {
        format!("{}.0", text)
    } else {
        text
    }
}

fn render_decimal(value: Decimal) -> String {
    let normalized = value.normalize();
    if normalized.scale() == 0 {
        format!("{}.0", normalized)
    } else {
        normalized.to_string()
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $wide:ty: $($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(value: $t) -> Self {
                    Self::$variant(value as $wide)
                }
            }
        )*
    };
}

impl_from_int!(Signed, i128: i8, i16, i32, i64, i128, isize);
impl_from_int!(Unsigned, u128: u8, u16, u32, u64, u128, usize);

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        Self::Single(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<Decimal> for ParamValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::date(value)
    }
}

impl From<Media> for ParamValue {
    fn from(value: Media) -> Self {
        Self::Media(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(value: Vec<T>) -> Self {
        Self::list(value)
    }
}

impl<T: Into<ParamValue> + Clone> From<&[T]> for ParamValue {
    fn from(value: &[T]) -> Self {
        Self::list(value.iter().cloned())
    }
}

/// Ordered, duplicate-free request parameters
#[derive(Debug, Default)]
pub struct Parameters {
    entries: Vec<(String, ParamValue)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit ordered pairs, rejecting duplicate keys
    pub fn from_pairs<I, K, V>(pairs: I) -> TwitterResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key, value)?;
        }
        Ok(params)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> TwitterResult<()> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() {
            return Err(TwitterError::InvalidParameter(
                "parameter name cannot be empty".to_string(),
            ));
        }
        if self.contains_key(&key) {
            return Err(TwitterError::DuplicateParameter(key));
        }
        if let ParamValue::List(items) = &value {
            if items.iter().any(ParamValue::contains_media) {
                return Err(TwitterError::InvalidParameter(format!(
                    "list parameter '{}' cannot contain binary payloads",
                    key
                )));
            }
        }

        self.entries.push((key, value));
        Ok(())
    }

    /// Insert when present; absent values never reach the wire
    pub fn insert_opt<V: Into<ParamValue>>(
        &mut self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> TwitterResult<()> {
        match value {
            Some(value) => self.insert(key, value),
            None => Ok(()),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> TwitterResult<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn with_opt<V: Into<ParamValue>>(
        mut self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> TwitterResult<Self> {
        self.insert_opt(key, value)?;
        Ok(self)
    }

    /// Append every parameter of a typed parameter struct
    pub fn extend_from<T: ToParameters + ?Sized>(&mut self, source: &T) -> TwitterResult<()> {
        for (key, value) in source.to_parameters()?.entries {
            self.insert(key, value)?;
        }
        Ok(())
    }

    /// Remove a parameter, keeping the order of the rest
    pub fn take(&mut self, key: &str) -> Option<ParamValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn has_media(&self) -> bool {
        self.entries.iter().any(|(_, v)| v.is_media())
    }

    /// Text parameters rendered in declared order; binary payloads are skipped
    pub fn rendered(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.render().map(|text| (k.clone(), text)))
            .collect()
    }

    /// `application/x-www-form-urlencoded` form of the text parameters
    pub fn to_query_string(&self) -> String {
        self.rendered()
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    crate::core::kernel::signer::percent_encode(k),
                    crate::core::kernel::signer::percent_encode(v)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn into_entries(self) -> Vec<(String, ParamValue)> {
        self.entries
    }
}

impl ToParameters for [(&str, &str)] {
    fn to_parameters(&self) -> TwitterResult<Parameters> {
        Parameters::from_pairs(self.iter().copied())
    }
}

/// Substitute `{name}` placeholders in an endpoint template with parameters
/// taken out of `params`.
pub fn expand_path(template: &str, params: &mut Parameters) -> TwitterResult<String> {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let end = rest[start..].find('}').ok_or_else(|| {
            TwitterError::InvalidParameter(format!("unterminated placeholder in '{}'", template))
        })? + start;

        path.push_str(&rest[..start]);
        let key = &rest[start + 1..end];
        let value = params
            .take(key)
            .ok_or_else(|| TwitterError::MissingParameter(key.to_string()))?;
        let text = value.render().ok_or_else(|| {
            TwitterError::InvalidParameter(format!("'{}' cannot be a binary payload", key))
        })?;
        path.push_str(&crate::core::kernel::signer::percent_encode(&text));
        rest = &rest[end + 1..];
    }

    path.push_str(rest);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ResultType {
        Recent,
        Popular,
    }

    impl ParamEnum for ResultType {
        fn name(&self) -> &'static str {
            match self {
                Self::Recent => "Recent",
                Self::Popular => "Popular",
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Include(u8);

    impl Include {
        const ENTITIES: Self = Self(1);
        const RETWEETS: Self = Self(2);
        const EMAIL: Self = Self(4);
    }

    impl ParamFlags for Include {
        fn all() -> &'static [(Self, &'static str)] {
            &[
                (Self::ENTITIES, "entities"),
                (Self::RETWEETS, "retweets"),
                (Self::EMAIL, "email"),
            ]
        }

        fn contains(&self, flag: &Self) -> bool {
            self.0 & flag.0 == flag.0
        }
    }

    #[test]
    fn test_integer_rendering() {
        assert_eq!(ParamValue::from(-42i32).render().unwrap(), "-42");
        assert_eq!(ParamValue::from(u64::MAX).render().unwrap(), "18446744073709551615");
        assert_eq!(ParamValue::from(1_000_000usize).render().unwrap(), "1000000");
    }

    #[test]
    fn test_float_rendering_keeps_one_fraction_digit() {
        assert_eq!(ParamValue::from(1.0f64).render().unwrap(), "1.0");
        assert_eq!(ParamValue::from(0.25f64).render().unwrap(), "0.25");
        assert_eq!(ParamValue::from(-3.5f32).render().unwrap(), "-3.5");
        assert_eq!(ParamValue::from(0.1f32).render().unwrap(), "0.1");
        assert_eq!(ParamValue::from(37.781157f64).render().unwrap(), "37.781157");
    }

    #[test]
    fn test_decimal_rendering_trims_trailing_zeros() {
        let value = Decimal::from_str("1.2500").unwrap();
        assert_eq!(ParamValue::from(value).render().unwrap(), "1.25");
        let whole = Decimal::from_str("100.00").unwrap();
        assert_eq!(ParamValue::from(whole).render().unwrap(), "100.0");
    }

    #[test]
    fn test_bool_and_dates() {
        assert_eq!(ParamValue::from(true).render().unwrap(), "true");
        assert_eq!(ParamValue::from(false).render().unwrap(), "false");

        let when = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 30).unwrap();
        assert_eq!(ParamValue::from(when).render().unwrap(), "202403070905");
        assert_eq!(ParamValue::iso_date(when).render().unwrap(), "2024-03-07T09:05:30Z");
        assert_eq!(ParamValue::date_only(when).render().unwrap(), "2024-03-07");
    }

    #[test]
    fn test_enum_and_flags() {
        assert_eq!(ParamValue::name(&ResultType::Popular).render().unwrap(), "popular");
        assert_eq!(ParamValue::name(&ResultType::Recent).render().unwrap(), "recent");

        let flags = Include(Include::EMAIL.0 | Include::ENTITIES.0);
        assert_eq!(ParamValue::flags(&flags).render().unwrap(), "entities,email");
    }

    #[test]
    fn test_sequences_are_comma_joined() {
        let ids = ParamValue::from(vec![1u64, 2, 3]);
        assert_eq!(ids.render().unwrap(), "1,2,3");
        let names: &[&str] = &["a", "b"];
        assert_eq!(ParamValue::from(names).render().unwrap(), "a,b");
    }

    #[test]
    fn test_absent_values_are_dropped() {
        let params = Parameters::new()
            .with("status", "hi")
            .unwrap()
            .with_opt("in_reply_to_status_id", None::<u64>)
            .unwrap()
            .with_opt("trim_user", Some(true))
            .unwrap();

        assert_eq!(
            params.rendered(),
            vec![
                ("status".to_string(), "hi".to_string()),
                ("trim_user".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = Parameters::from_pairs([("count", 1), ("count", 2)]);
        assert!(matches!(result, Err(TwitterError::DuplicateParameter(k)) if k == "count"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let build = || {
            Parameters::new()
                .with("q", "rust lang")
                .unwrap()
                .with("lat", 35.5f64)
                .unwrap()
                .with("ids", vec![7u32, 8])
                .unwrap()
        };
        assert_eq!(build().rendered(), build().rendered());
        assert_eq!(build().to_query_string(), "q=rust%20lang&lat=35.5&ids=7%2C8");
    }

    #[test]
    fn test_media_is_not_rendered() {
        let params = Parameters::new()
            .with("media", Media::bytes(vec![1u8, 2, 3]))
            .unwrap()
            .with("media_category", "tweet_image")
            .unwrap();

        assert!(params.has_media());
        assert_eq!(params.rendered().len(), 1);
    }

    #[test]
    fn test_list_with_media_rejected() {
        let list = ParamValue::List(vec![ParamValue::Media(Media::bytes(vec![0u8]))]);
        let result = Parameters::new().with("bad", list);
        assert!(matches!(result, Err(TwitterError::InvalidParameter(_))));
    }

    #[test]
    fn test_expand_path_takes_reserved_key() {
        let mut params = Parameters::from_pairs([("id", "123"), ("trim_user", "true")]).unwrap();
        let path = expand_path("statuses/destroy/{id}.json", &mut params).unwrap();

        assert_eq!(path, "statuses/destroy/123.json");
        assert!(!params.contains_key("id"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_expand_path_missing_key() {
        let mut params = Parameters::new();
        let result = expand_path("statuses/show/{id}.json", &mut params);
        assert!(matches!(result, Err(TwitterError::MissingParameter(k)) if k == "id"));
    }

    #[test]
    fn test_take_preserves_order() {
        let mut params = Parameters::from_pairs([("a", "1"), ("b", "2"), ("c", "3")]).unwrap();
        params.take("b");
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_query_string_parses_back_to_rendered_pairs() {
        let params = Parameters::new()
            .with("q", "fish & chips = 1+1 * 2")
            .unwrap()
            .with("lang", "日本語 ünïcode")
            .unwrap()
            .with("count", 20u32)
            .unwrap()
            .with("include_entities", false)
            .unwrap()
            .with("ids", vec![1u64, 2, 3])
            .unwrap();

        let query = params.to_query_string();
        assert!(!query.contains(' '));
        assert!(!query.contains('+'));

        let parsed: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(parsed, params.rendered());
    }
}
