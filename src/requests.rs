use crate::core::errors::TwitterResult;
use crate::core::params::{Media, ParamValue, Parameters};
use crate::core::traits::{ParamEnum, ToParameters};
use chrono::{DateTime, Utc};

/// Parameters of `statuses/update`
#[derive(Debug, Clone, Default)]
pub struct UpdateStatus {
    pub status: String,
    pub in_reply_to_status_id: Option<u64>,
    pub media_ids: Vec<u64>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub possibly_sensitive: Option<bool>,
    pub trim_user: Option<bool>,
}

impl UpdateStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn in_reply_to(mut self, status_id: u64) -> Self {
        self.in_reply_to_status_id = Some(status_id);
        self
    }

    pub fn with_media(mut self, media_id: u64) -> Self {
        self.media_ids.push(media_id);
        self
    }

    pub fn at(mut self, lat: f64, long: f64) -> Self {
        self.lat = Some(lat);
        self.long = Some(long);
        self
    }
}

impl ToParameters for UpdateStatus {
    fn to_parameters(&self) -> TwitterResult<Parameters> {
        let mut params = Parameters::new().with("status", &self.status)?;
        params.insert_opt("in_reply_to_status_id", self.in_reply_to_status_id)?;
        if !self.media_ids.is_empty() {
            params.insert("media_ids", self.media_ids.as_slice())?;
        }
        params.insert_opt("lat", self.lat)?;
        params.insert_opt("long", self.long)?;
        params.insert_opt("possibly_sensitive", self.possibly_sensitive)?;
        params.insert_opt("trim_user", self.trim_user)?;
        Ok(params)
    }
}

/// Whom a timeline request is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(u64),
    ScreenName(String),
}

/// Parameters of `statuses/user_timeline`
#[derive(Debug, Clone, Default)]
pub struct TimelineParameters {
    pub user: Option<UserRef>,
    pub count: Option<u32>,
    pub since_id: Option<u64>,
    pub max_id: Option<u64>,
    pub exclude_replies: Option<bool>,
    pub include_rts: Option<bool>,
}

impl ToParameters for TimelineParameters {
    fn to_parameters(&self) -> TwitterResult<Parameters> {
        let mut params = Parameters::new();
        match &self.user {
            Some(UserRef::Id(id)) => params.insert("user_id", *id)?,
            Some(UserRef::ScreenName(name)) => params.insert("screen_name", name)?,
            None => {}
        }
        params.insert_opt("count", self.count)?;
        params.insert_opt("since_id", self.since_id)?;
        params.insert_opt("max_id", self.max_id)?;
        params.insert_opt("exclude_replies", self.exclude_replies)?;
        params.insert_opt("include_rts", self.include_rts)?;
        Ok(params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Mixed,
    Recent,
    Popular,
}

impl ParamEnum for ResultType {
    fn name(&self) -> &'static str {
        match self {
            Self::Mixed => "Mixed",
            Self::Recent => "Recent",
            Self::Popular => "Popular",
        }
    }
}

/// Parameters of `search/tweets`
#[derive(Debug, Clone, Default)]
pub struct SearchParameters {
    pub query: String,
    pub result_type: Option<ResultType>,
    pub count: Option<u32>,
    /// Statuses created before this day
    pub until: Option<DateTime<Utc>>,
    pub since_id: Option<u64>,
    pub lang: Option<String>,
}

impl SearchParameters {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

impl ToParameters for SearchParameters {
    fn to_parameters(&self) -> TwitterResult<Parameters> {
        let mut params = Parameters::new().with("q", &self.query)?;
        params.insert_opt("result_type", self.result_type.as_ref().map(ParamValue::name))?;
        params.insert_opt("count", self.count)?;
        params.insert_opt("until", self.until.map(ParamValue::date_only))?;
        params.insert_opt("since_id", self.since_id)?;
        params.insert_opt("lang", self.lang.as_ref())?;
        Ok(params)
    }
}

/// Parameters of a single-request `media/upload`
#[derive(Debug)]
pub struct UploadMedia {
    pub media: Media,
    pub media_category: Option<String>,
    pub additional_owners: Vec<u64>,
}

impl UploadMedia {
    pub fn new(media: Media) -> Self {
        Self {
            media,
            media_category: None,
            additional_owners: Vec::new(),
        }
    }

    pub fn into_parameters(self) -> TwitterResult<Parameters> {
        let mut params = Parameters::new().with("media", self.media)?;
        params.insert_opt("media_category", self.media_category)?;
        if !self.additional_owners.is_empty() {
            params.insert("additional_owners", self.additional_owners)?;
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_update_status_skips_absent_fields() {
        let params = UpdateStatus::new("hello").with_media(1).with_media(2).to_parameters().unwrap();
        assert_eq!(
            params.rendered(),
            vec![
                ("status".to_string(), "hello".to_string()),
                ("media_ids".to_string(), "1,2".to_string()),
            ]
        );
    }

    #[test]
    fn test_update_status_coordinates() {
        let params = UpdateStatus::new("here").at(37.0, -122.5).to_parameters().unwrap();
        assert_eq!(params.get("lat").and_then(ParamValue::render).as_deref(), Some("37.0"));
        assert_eq!(params.get("long").and_then(ParamValue::render).as_deref(), Some("-122.5"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let request = UpdateStatus::new("same").in_reply_to(99);
        assert_eq!(
            request.to_parameters().unwrap().to_query_string(),
            request.to_parameters().unwrap().to_query_string()
        );
    }

    #[test]
    fn test_timeline_by_screen_name() {
        let params = TimelineParameters {
            user: Some(UserRef::ScreenName("jack".to_string())),
            count: Some(20),
            include_rts: Some(false),
            ..Default::default()
        }
        .to_parameters()
        .unwrap();

        assert_eq!(params.to_query_string(), "screen_name=jack&count=20&include_rts=false");
    }

    #[test]
    fn test_search_parameters() {
        let params = SearchParameters {
            result_type: Some(ResultType::Recent),
            until: Some(Utc.with_ymd_and_hms(2024, 3, 9, 15, 30, 0).unwrap()),
            ..SearchParameters::new("#rust")
        }
        .to_parameters()
        .unwrap();

        assert_eq!(params.to_query_string(), "q=%23rust&result_type=recent&until=2024-03-09");
    }

    #[test]
    fn test_upload_has_media() {
        let params = UploadMedia::new(Media::bytes(vec![1u8])).into_parameters().unwrap();
        assert!(params.has_media());
    }
}
