use crate::core::config::ConnectionOptions;
use crate::core::errors::{TwitterError, TwitterResult};
use crate::core::params::{ParamValue, Parameters};
use crate::core::traits::{ParamEnum, ToParameters};
use reqwest::Method;

/// The long-lived streaming endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Public statuses matching track/follow/locations predicates
    Filter,
    /// A small random sample of all public statuses
    Sample,
    /// Messages for the authenticating user
    User,
    /// Messages for a set of users
    Site,
}

impl StreamKind {
    pub fn method(self) -> Method {
        match self {
            Self::Filter => Method::POST,
            Self::Sample | Self::User | Self::Site => Method::GET,
        }
    }

    pub fn url(self, options: &ConnectionOptions) -> String {
        let (base, path) = match self {
            Self::Filter => (&options.stream_url, "statuses/filter.json"),
            Self::Sample => (&options.stream_url, "statuses/sample.json"),
            Self::User => (&options.user_stream_url, "user.json"),
            Self::Site => (&options.site_stream_url, "site.json"),
        };
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

/// Whether a user stream includes messages for followings or only the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamWith {
    User,
    Followings,
}

impl ParamEnum for StreamWith {
    fn name(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Followings => "followings",
        }
    }
}

/// Predicates and options for a streaming connection
#[derive(Debug, Clone, Default)]
pub struct StreamParameters {
    pub track: Vec<String>,
    pub follow: Vec<u64>,
    /// Bounding boxes as `[sw_lon, sw_lat, ne_lon, ne_lat]`
    pub locations: Vec<[f64; 4]>,
    pub languages: Vec<String>,
    pub stall_warnings: Option<bool>,
    pub with: Option<StreamWith>,
    pub replies_all: bool,
}

impl StreamParameters {
    pub fn track<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.track.extend(terms.into_iter().map(Into::into));
        self
    }

    pub fn follow(mut self, user_ids: impl IntoIterator<Item = u64>) -> Self {
        self.follow.extend(user_ids);
        self
    }

    pub fn location(mut self, bounding_box: [f64; 4]) -> Self {
        self.locations.push(bounding_box);
        self
    }

    pub fn with_stall_warnings(mut self) -> Self {
        self.stall_warnings = Some(true);
        self
    }

    /// Reject combinations the endpoint would refuse
    pub fn validate(&self, kind: StreamKind) -> TwitterResult<()> {
        if kind == StreamKind::Filter
            && self.track.is_empty()
            && self.follow.is_empty()
            && self.locations.is_empty()
        {
            return Err(TwitterError::MissingParameter(
                "track, follow or locations".to_string(),
            ));
        }
        if kind == StreamKind::Site && self.follow.is_empty() {
            return Err(TwitterError::MissingParameter("follow".to_string()));
        }
        Ok(())
    }
}

fn non_empty<T: Into<ParamValue> + Clone>(items: &[T]) -> Option<ParamValue> {
    if items.is_empty() {
        None
    } else {
        Some(ParamValue::from(items))
    }
}

impl ToParameters for StreamParameters {
    fn to_parameters(&self) -> crate::core::errors::TwitterResult<Parameters> {
        let locations: Vec<f64> = self.locations.iter().flatten().copied().collect();

        let mut params = Parameters::new();
        params.insert_opt("track", non_empty(&self.track))?;
        params.insert_opt("follow", non_empty(&self.follow))?;
        params.insert_opt("locations", non_empty(&locations))?;
        params.insert_opt("language", non_empty(&self.languages))?;
        params.insert_opt("stall_warnings", self.stall_warnings)?;
        params.insert_opt("with", self.with.as_ref().map(ParamValue::name))?;
        if self.replies_all {
            params.insert("replies", "all")?;
        }
        Ok(params)
    }
}
