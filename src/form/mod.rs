use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::api::models::CATEGORIES;
use crate::api::NewInitiative;

pub const DEFAULT_LATITUDE: f64 = 46.0569;
pub const DEFAULT_LONGITUDE: f64 = 14.5058;
pub const MAP_LOCATION_LABEL: &str = "Selected location on map";
pub const CITY: &str = "Ljubljana";

const TITLE_MIN: usize = 3;
const TITLE_MAX: usize = 100;
const DESCRIPTION_MIN: usize = 10;
const DESCRIPTION_MAX: usize = 500;

static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn email_regex() -> Option<&'static Regex> {
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormError {
    #[error("pick a point on the map or enter a street and house number")]
    MissingLocation,

    #[error("coordinates out of range: {latitude}, {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("title must be 3-100 characters (got {len})")]
    TitleLength { len: usize },

    #[error("description must be 10-500 characters (got {len})")]
    DescriptionLength { len: usize },

    #[error("unknown category: {category}")]
    UnknownCategory { category: String },

    #[error("invalid e-mail address: {email}")]
    InvalidEmail { email: String },

    #[error("image not found: {path}")]
    ImageNotFound { path: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Step {
    #[default]
    Location,
    Details,
    Contact,
    Ready,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LocationInput {
    #[default]
    Unset,
    MapPoint,
    Address { street: String, number: String },
}

/// Initiative submission wizard: location, then details, then contact.
#[derive(Clone, Debug, PartialEq)]
pub struct InitiativeDraft {
    step: Step,
    pub location: LocationInput,
    pub latitude: f64,
    pub longitude: f64,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub email: String,
    pub image: Option<PathBuf>,
}

impl Default for InitiativeDraft {
    fn default() -> Self {
        Self {
            step: Step::Location,
            location: LocationInput::Unset,
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            title: String::new(),
            description: String::new(),
            category: None,
            email: String::new(),
            image: None,
        }
    }
}

impl InitiativeDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn set_map_point(&mut self, latitude: f64, longitude: f64) {
        self.latitude = latitude;
        self.longitude = longitude;
        self.location = LocationInput::MapPoint;
    }

    pub fn set_address(&mut self, street: impl Into<String>, number: impl Into<String>) {
        self.location = LocationInput::Address {
            street: street.into(),
            number: number.into(),
        };
    }

    /// Text sent as the initiative's `location` field.
    pub fn location_label(&self) -> Option<String> {
        match &self.location {
            LocationInput::Unset => None,
            LocationInput::MapPoint => Some(MAP_LOCATION_LABEL.to_string()),
            LocationInput::Address { street, number } => {
                let street = street.trim();
                let number = number.trim();
                if street.is_empty() || number.is_empty() {
                    None
                } else {
                    Some(format!("{street} {number}, {CITY}"))
                }
            }
        }
    }

    fn check_location(&self) -> Result<(), FormError> {
        if self.location_label().is_none() {
            return Err(FormError::MissingLocation);
        }
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if !lat_ok || !lon_ok {
            return Err(FormError::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        Ok(())
    }

    fn check_details(&self) -> Result<(), FormError> {
        let len = self.title.trim().chars().count();
        if !(TITLE_MIN..=TITLE_MAX).contains(&len) {
            return Err(FormError::TitleLength { len });
        }
        let len = self.description.trim().chars().count();
        if !(DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&len) {
            return Err(FormError::DescriptionLength { len });
        }
        if let Some(category) = self.category.as_deref() {
            if !CATEGORIES.iter().any(|c| c.trim() == category.trim()) {
                return Err(FormError::UnknownCategory {
                    category: category.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_contact(&self) -> Result<(), FormError> {
        let email = self.email.trim();
        let valid = email_regex().is_some_and(|re| re.is_match(email));
        if !valid {
            return Err(FormError::InvalidEmail {
                email: email.to_string(),
            });
        }
        if let Some(image) = self.image.as_ref() {
            if !image.is_file() {
                return Err(FormError::ImageNotFound {
                    path: image.display().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn validate_step(&self, step: Step) -> Result<(), FormError> {
        match step {
            Step::Location => self.check_location(),
            Step::Details => self.check_details(),
            Step::Contact => self.check_contact(),
            Step::Ready => {
                self.check_location()?;
                self.check_details()?;
                self.check_contact()
            }
        }
    }

    /// Validates the current step and moves to the next one.
    pub fn advance(&mut self) -> Result<Step, FormError> {
        self.validate_step(self.step)?;
        self.step = match self.step {
            Step::Location => Step::Details,
            Step::Details => Step::Contact,
            Step::Contact | Step::Ready => Step::Ready,
        };
        Ok(self.step)
    }

    pub fn back(&mut self) -> Step {
        self.step = match self.step {
            Step::Location | Step::Details => Step::Location,
            Step::Contact => Step::Details,
            Step::Ready => Step::Contact,
        };
        self.step
    }

    pub fn into_request(self) -> Result<NewInitiative, FormError> {
        self.validate_step(Step::Ready)?;
        let location = self.location_label().ok_or(FormError::MissingLocation)?;
        // Keep the backend's exact spelling, trailing spaces included.
        let category = self.category.as_deref().and_then(|wanted| {
            CATEGORIES
                .iter()
                .find(|c| c.trim() == wanted.trim())
                .map(|c| c.to_string())
        });
        Ok(NewInitiative {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            location,
            latitude: self.latitude,
            longitude: self.longitude,
            email: self.email.trim().to_string(),
            category,
            image: self.image,
        })
    }
}
