//! Poller configuration
//!
//! Immutable process-wide options: defaults merged with caller overrides at
//! construction, validated once, never mutated afterwards.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Production NIBE Uplink API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.nibeuplink.com";

/// Out-of-band redirect: the operator copies the code from the consent page.
pub const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// When to trigger a fetch cycle.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed delay between cycle completions.
    Interval(Duration),
    /// Cron expression, evaluated in the configured timezone.
    Cron(cron::Schedule),
}

impl Schedule {
    /// Fixed-interval schedule in seconds.
    pub fn interval_secs(secs: u64) -> Self {
        Schedule::Interval(Duration::from_secs(secs))
    }

    /// Parse a cron expression (`sec min hour day month weekday`).
    pub fn cron(expr: &str) -> Result<Self> {
        cron::Schedule::from_str(expr)
            .map(Schedule::Cron)
            .map_err(|e| Error::Validation(format!("invalid cron expression {:?}: {}", expr, e)))
    }

    /// Delay until the next tick, from now.
    pub fn next_delay(&self, tz: Tz) -> Duration {
        match self {
            Schedule::Interval(d) => *d,
            Schedule::Cron(schedule) => {
                let now = chrono::Utc::now().with_timezone(&tz);
                schedule
                    .after(&now)
                    .next()
                    .and_then(|next| (next - now).to_std().ok())
                    // Exhausted schedules re-check once a minute.
                    .unwrap_or(Duration::from_secs(60))
            }
        }
    }
}

/// Process-wide poller options.
#[derive(Debug, Clone)]
pub struct Options {
    /// OAuth2 client id issued by the vendor (32 characters).
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Numeric id of the heat-pump system to poll.
    pub system_id: u64,
    pub base_url: String,
    pub redirect_uri: String,
    pub scope: String,
    /// Start polling on construction (requires a running tokio runtime).
    pub auto_start: bool,
    pub timeout: Duration,
    /// Maximum accepted response body size in bytes.
    pub max_bytes: usize,
    pub follow_redirects: usize,
    pub user_agent: String,
    /// Vendor parameter code -> stable semantic key. Extendable by the caller.
    pub parameters: HashMap<String, String>,
    pub schedule: Schedule,
    pub timezone: Tz,
    /// Renew the access token this long before its stored expiry.
    pub renew_before_expiry: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            system_id: 0,
            base_url: DEFAULT_BASE_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: "READSYSTEM".to_string(),
            auto_start: true,
            timeout: Duration::from_secs(60),
            max_bytes: 1_048_576,
            follow_redirects: 2,
            user_agent: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
                .to_string(),
            parameters: default_parameters(),
            schedule: Schedule::interval_secs(15),
            timezone: chrono_tz::Europe::Berlin,
            renew_before_expiry: Duration::from_secs(5 * 60),
        }
    }
}

impl Options {
    /// Defaults plus the three required fields.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, system_id: u64) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            system_id,
            ..Self::default()
        }
    }

    /// Check required fields. Fatal at construction.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.len() != 32 {
            return Err(Error::Validation(
                "client_id must be exactly 32 characters".to_string(),
            ));
        }
        if self.client_secret.is_empty() {
            return Err(Error::Validation("client_secret is required".to_string()));
        }
        if self.system_id == 0 {
            return Err(Error::Validation("system_id is required".to_string()));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| Error::Validation(format!("invalid base_url {:?}: {}", self.base_url, e)))?;
        Ok(())
    }

    /// Renewal margin in epoch milliseconds.
    pub fn renew_before_expiry_ms(&self) -> i64 {
        self.renew_before_expiry.as_millis() as i64
    }
}

/// Known vendor parameter codes mapped to stable semantic names.
pub fn default_parameters() -> HashMap<String, String> {
    const TABLE: &[(&str, &str)] = &[
        ("10001", "ventilation_fan_speed"),
        ("10012", "cpr_info_ep14_blocked"),
        ("10033", "addition_blocked"),
        ("40004", "status_outdoor_temp"),
        ("40008", "system_1_heat_medium_flow"),
        ("40012", "cpr_info_ep14_condenser_return"),
        ("40013", "status_hot_water_top"),
        ("40014", "status_hot_water_charging"),
        ("40017", "cpr_info_ep14_condenser_out"),
        ("40018", "cpr_info_ep14_hot_gas"),
        ("40019", "cpr_info_ep14_liquid_line"),
        ("40020", "cpr_info_ep14_evaporator"),
        ("40022", "cpr_info_ep14_suction_gas"),
        ("40025", "ventilation_exhaust_air"),
        ("40026", "ventilation_extract_air"),
        ("40033", "system_1_room_temperature"),
        ("40067", "status_avg_outdoor_temp"),
        ("40071", "system_1_external_flow_temp"),
        ("40072", "heat_meter_flow"),
        ("40101", "outdoor_air_mix_incoming_air_temp"),
        ("40919", "outdoor_air_mix_status"),
        ("41026", "defrosting_value_air_velocity_sensor"),
        ("43005", "status_degree_minutes"),
        ("43009", "system_1_calculated_flow_temp"),
        ("43081", "addition_time_factor"),
        ("43084", "addition_electrical_addition_power"),
        ("43123", "cpr_info_ep14_allowed_compr_freq"),
        ("43124", "defrosting_reference_air_velocity_sensor"),
        ("43125", "defrosting_decrease_from_reference"),
        ("43136", "cpr_info_ep14_current_compr_frequency"),
        ("43161", "system_1_external_adjustment"),
        ("43416", "cpr_info_ep14_compressor_starts"),
        ("43420", "cpr_info_ep14_compressor_operating_time"),
        ("43424", "cpr_info_ep14_compressor_operating_time_hot_water"),
        ("43437", "cpr_info_ep14_pump_speed_heating_medium"),
        ("44298", "heat_meter_hw_incl_int_add"),
        ("44300", "heat_meter_heating_int_add_incl"),
        ("44306", "heat_meter_hotwater_compr_only"),
        ("44308", "heat_meter_heating_compr_only"),
        ("47212", "addition_set_max_electrical_add"),
        ("47214", "addition_fuse_size"),
        ("47407", "aux_in_out_aux_1"),
        ("47408", "aux_in_out_aux_2"),
        ("47409", "aux_in_out_aux_3"),
        ("47410", "aux_in_out_aux_4"),
        ("47411", "aux_in_out_aux_5"),
        ("47412", "aux_in_out_x"),
        ("48745", "system_info_country"),
    ];

    TABLE
        .iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect()
}
