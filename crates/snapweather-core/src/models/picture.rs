use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A server-side record pairing an uploaded photo with where it was taken and
/// the weather at that moment.
///
/// Numbers arrive as strings (`"48.8566"`); the typed accessors parse them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Picture {
    pub datetime: String,
    #[serde(rename = "fileName", alias = "filename")]
    pub filename: String,
    pub latitude: String,
    pub longitude: String,
    #[serde(rename = "user", alias = "author")]
    pub author: PictureAuthor,
    #[serde(rename = "weatherDetails", alias = "weather")]
    pub weather: WeatherDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PictureAuthor {
    #[serde(rename = "user_name", alias = "username")]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct WeatherDetails {
    pub city: String,
    pub description: String,
    #[serde(alias = "iconUrl")]
    pub icon_url: String,
    #[serde(alias = "largeIconUrl")]
    pub large_icon_url: String,
    #[serde(rename = "feltTemperature", alias = "felt_temperature")]
    pub felt_temperature: String,
}

impl Picture {
    /// The server-assigned filename doubles as the unique id
    pub fn id(&self) -> &str {
        &self.filename
    }

    pub fn latitude_deg(&self) -> Option<f64> {
        parse_decimal(&self.latitude)
    }

    pub fn longitude_deg(&self) -> Option<f64> {
        parse_decimal(&self.longitude)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude_deg()?, self.longitude_deg()?))
    }

    pub fn taken_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.datetime).ok()
    }

    /// Capture date for display, or the raw string if it does not parse
    pub fn date_display(&self) -> String {
        match self.taken_at() {
            Some(dt) => dt.format("%b %d, %Y %H:%M").to_string(),
            None => self.datetime.clone(),
        }
    }

    /// Check the fields the map view relies on
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.filename.is_empty() {
            return Err("picture with empty fileName".to_string());
        }
        match self.coordinates() {
            Some((lat, lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => {}
            _ => {
                return Err(format!(
                    "picture '{}' has invalid coordinates ({}, {})",
                    self.filename, self.latitude, self.longitude
                ))
            }
        }
        if self.weather.felt_temperature_c().is_none() {
            return Err(format!(
                "picture '{}' has invalid feltTemperature '{}'",
                self.filename, self.weather.felt_temperature
            ));
        }
        Ok(())
    }
}

impl WeatherDetails {
    pub fn felt_temperature_c(&self) -> Option<f64> {
        parse_decimal(&self.felt_temperature)
    }
}

fn parse_decimal(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PICTURE_JSON: &str = r#"{
        "datetime": "2025-01-05T14:30:00Z",
        "fileName": "img1.heic",
        "latitude": "48.8566",
        "longitude": "2.3522",
        "user": {"user_name": "alice"},
        "weatherDetails": {
            "city": "Paris",
            "description": "light rain",
            "icon_url": "https://openweathermap.org/img/wn/10d.png",
            "large_icon_url": "https://openweathermap.org/img/wn/10d@4x.png",
            "feltTemperature": "3.71"
        }
    }"#;

    #[test]
    fn test_parse_wire_format() {
        let picture: Picture = serde_json::from_str(PICTURE_JSON).unwrap();
        assert_eq!(picture.id(), "img1.heic");
        assert_eq!(picture.author.username, "alice");
        assert_eq!(picture.weather.city, "Paris");
        assert_eq!(picture.coordinates(), Some((48.8566, 2.3522)));
        assert_eq!(picture.weather.felt_temperature_c(), Some(3.71));
        assert!(picture.validate().is_ok());
    }

    #[test]
    fn test_parse_alias_names() {
        let json = r#"{
            "datetime": "2025-01-05T14:30:00+01:00",
            "filename": "img2.heic",
            "latitude": "-33.8688",
            "longitude": "151.2093",
            "author": {"username": "bob"},
            "weather": {
                "city": "Sydney",
                "description": "clear sky",
                "iconUrl": "https://example.com/01d.png",
                "largeIconUrl": "https://example.com/01d@4x.png",
                "felt_temperature": "24"
            }
        }"#;
        let picture: Picture = serde_json::from_str(json).unwrap();
        assert_eq!(picture.id(), "img2.heic");
        assert_eq!(picture.author.username, "bob");
        assert_eq!(picture.weather.icon_url, "https://example.com/01d.png");
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let json = PICTURE_JSON.replace(r#""fileName": "img1.heic","#, "");
        assert!(serde_json::from_str::<Picture>(&json).is_err());
    }

    #[test]
    fn test_date_display() {
        let picture: Picture = serde_json::from_str(PICTURE_JSON).unwrap();
        assert_eq!(picture.date_display(), "Jan 05, 2025 14:30");

        let mut odd = picture.clone();
        odd.datetime = "yesterday".to_string();
        assert!(odd.taken_at().is_none());
        assert_eq!(odd.date_display(), "yesterday");
    }

    #[test]
    fn test_validate_rejects_bad_numbers() {
        let picture: Picture = serde_json::from_str(PICTURE_JSON).unwrap();

        let mut bad = picture.clone();
        bad.latitude = "north".to_string();
        assert!(bad.validate().is_err());

        let mut bad = picture.clone();
        bad.longitude = "200.0".to_string();
        assert!(bad.validate().is_err());

        let mut bad = picture.clone();
        bad.weather.felt_temperature = "NaN".to_string();
        assert!(bad.validate().is_err());

        let mut bad = picture;
        bad.filename.clear();
        assert!(bad.validate().is_err());
    }
}
