use weather_lookup_core::{RequestState, Units};

/// Text shown for a request state: a spinner line while loading, otherwise
/// the error (if any) followed by the current report (if any).
pub fn render(state: &RequestState, units: Units) -> String {
    if state.is_loading {
        return "Loading...".to_string();
    }

    let mut lines = Vec::new();

    if let Some(error) = &state.error {
        lines.push(error.clone());
    }

    if let Some(report) = &state.report {
        if let Some(name) = &report.location_name {
            lines.push(format!("Location:    {name}"));
        }
        lines.push(format!(
            "Temperature: {:.1} {}",
            report.temperature,
            units.temperature_symbol()
        ));
        if let Some(description) = &report.description {
            lines.push(format!("Conditions:  {description}"));
        }
        if let Some(humidity) = report.humidity {
            lines.push(format!("Humidity:    {humidity}%"));
        }
        if let Some(observed_at) = report.observed_at {
            lines.push(format!("Observed:    {}", observed_at.format("%Y-%m-%d %H:%M UTC")));
        }
        lines.push(format!("Icon:        {}", report.icon_url()));
    }

    if lines.is_empty() {
        lines.push("No weather data yet.".to_string());
    }

    lines.join("\n")
}
