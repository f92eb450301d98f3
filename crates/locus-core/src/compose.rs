//! Turning a forecast into the text of the morning notification.

use time::UtcOffset;
use time::macros::format_description;
use tracing::{debug, info};

use locus_types::WeatherSample;

use crate::error::{Error, Result};
use crate::traits::TextGenerator;
use crate::weather::Forecast;

/// Instructions appended to the forecast table in the advisory prompt.
pub const ADVICE_INSTRUCTIONS: &str = r#"You are presented with a weather forecast for the day.
Your task is to give actionable sugestions. E.g. "- Bring an umbrella.", "Wear gloves.".
Do not include anything else in your message.
For example:
Example message: - Dress warmly.
- Take umbrella.
Example message: - Dress warmly.
- Feels colder than actual temperature.
Example message: - Dress light.
- Take sunglasses.
"#;

/// Render one line per sample, with times in `offset`.
///
/// Temperatures and wind speeds are rounded to whole numbers (ties to even).
pub fn format_weather(samples: &[WeatherSample], offset: UtcOffset) -> String {
    let hhmm = format_description!("[hour]:[minute]");

    samples
        .iter()
        .map(|s| {
            let time = s
                .timestamp
                .to_offset(offset)
                .format(hhmm)
                .unwrap_or_default();
            format!(
                "{time}: {} | {}°C (feels like {}°C) | Pressure: {} hPa | Humidity: {}% | \
                 Wind: {} km/h (gust {} km/h) {}° | Cloudiness: {}% | Prob. precip: {}% | \
                 Rain: {} mm | Snow: {} mm",
                s.weather,
                whole(s.temp),
                whole(s.temp_feels_like),
                s.pressure,
                s.humidity,
                whole(s.wind_speed),
                whole(s.wind_gust),
                s.wind_direction,
                s.cloudiness,
                s.prob_precip,
                s.rain,
                s.snow,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The prompt sent to the text generator.
pub fn build_prompt(forecast: &Forecast) -> String {
    let table = format_weather(&forecast.samples, forecast.offset);
    let metadata = serde_json::to_string(&forecast.metadata).unwrap_or_default();

    format!(
        "It is 6am. The following is a weather forecast for today:\n```\n{table}\n```\n\
         {ADVICE_INSTRUCTIONS}\nAdditional metadata:\n{metadata}\n"
    )
}

/// Message used when text generation is disabled.
pub fn plain_message(forecast: &Forecast) -> String {
    let meta = &forecast.metadata;
    format!(
        "Here is the weather forecast for {}, {}:\n{}\nSunrise: {}\nSunset: {}",
        meta.name,
        meta.country,
        format_weather(&forecast.samples, forecast.offset),
        meta.sunrise,
        meta.sunset,
    )
}

/// Compose the notification body, through the generator when `use_llm` is set.
pub async fn compose_message(
    forecast: &Forecast,
    generator: &dyn TextGenerator,
    use_llm: bool,
) -> Result<String> {
    if !use_llm {
        debug!("Text generation disabled, using plain forecast");
        return Ok(plain_message(forecast));
    }

    let prompt = build_prompt(forecast);
    let reply = generator.complete(&prompt).await?;
    if reply.trim().is_empty() {
        return Err(Error::EmptyReply);
    }

    info!("Generated advice ({} chars)", reply.len());
    Ok(reply)
}

fn whole(value: f64) -> i64 {
    value.round_ties_even() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTextGenerator, sample_forecast};
    use crate::weather::parse_forecast;
    use time::macros::{datetime, offset};

    fn forecast() -> Forecast {
        let now = datetime!(2024-05-28 04:00 UTC);
        parse_forecast(&sample_forecast(now, 2, 7200), now).unwrap()
    }

    #[test]
    fn test_format_weather_line() {
        let text = format_weather(&forecast().samples, offset!(+2));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "06:00: light rain | 15°C (feels like 14°C) | Pressure: 1012 hPa | Humidity: 70% | \
             Wind: 18 km/h (gust 25 km/h) 240° | Cloudiness: 75% | Prob. precip: 20% | \
             Rain: 0.5 mm | Snow: 0 mm"
        );
        assert!(lines[1].starts_with("09:00: "));
    }

    #[test]
    fn test_rounding_ties_to_even() {
        assert_eq!(whole(2.5), 2);
        assert_eq!(whole(3.5), 4);
        assert_eq!(whole(-0.4), 0);
    }

    #[test]
    fn test_build_prompt_contains_table_and_metadata() {
        let prompt = build_prompt(&forecast());
        assert!(prompt.starts_with("It is 6am. The following is a weather forecast for today:\n```\n06:00: "));
        assert!(prompt.contains("Your task is to give actionable sugestions."));
        assert!(prompt.contains("Additional metadata:\n{\"name\":\"Amsterdam\""));
    }

    #[test]
    fn test_plain_message_keeps_sunrise_and_sunset() {
        let message = plain_message(&forecast());
        assert!(message.starts_with("Here is the weather forecast for Amsterdam, NL:\n"));
        assert!(message.contains("\nSunrise: "));
        assert!(message.contains("\nSunset: "));
    }

    #[tokio::test]
    async fn test_compose_with_generator() {
        let generator = MockTextGenerator::new("- Take umbrella.");
        let message = compose_message(&forecast(), &generator, true).await.unwrap();
        assert_eq!(message, "- Take umbrella.");

        let prompts = generator.prompts().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("light rain"));
    }

    #[tokio::test]
    async fn test_compose_without_generator() {
        let generator = MockTextGenerator::new("unused");
        let message = compose_message(&forecast(), &generator, false).await.unwrap();
        assert!(message.starts_with("Here is the weather forecast"));
        assert!(generator.prompts().await.is_empty());
    }

    #[tokio::test]
    async fn test_compose_rejects_empty_reply() {
        let generator = MockTextGenerator::new("   ");
        let err = compose_message(&forecast(), &generator, true).await.unwrap_err();
        assert!(matches!(err, Error::EmptyReply));
    }
}
