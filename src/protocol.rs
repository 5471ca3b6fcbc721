use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use url::Url;

pub const DEFAULT_API_BASE: &str =
    "https://pointt-api.bosch-thermotechnology.com/pointt-api/api/v1/gateways/";
pub const DEFAULT_TOKEN_URL: &str = "https://singlekey-id.com/auth/connect/token";
const LOGIN_URL: &str = "https://singlekey-id.com/auth/en-us/login";
const AUTHORIZE_CALLBACK: &str = "/auth/connect/authorize/callback?";

pub const CLIENT_ID: &str = "762162C0-FA2D-4540-AE66-6489F189FADC";
pub const REDIRECT_URI: &str = "com.bosch.tt.dashtt.pointt://app/login";
pub const CODE_VERIFIER: &str = "abcdefghijklmnopqrstuvwxyz0123456789abcdefghijklm";
const SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "offline_access",
    "pointt.gateway.claiming",
    "pointt.gateway.removal",
    "pointt.gateway.list",
    "pointt.gateway.users",
    "pointt.gateway.resource.dashapp",
    "pointt.castt.flow.token-exchange",
    "bacon",
];

pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

// Heating circuit
pub const HC_ROOM_TEMP: &str = "/heatingCircuits/hc1/roomtemperature";
pub const HC_CURRENT_SETPOINT: &str = "/heatingCircuits/hc1/currentRoomSetpoint";
pub const HC_TEMP_OVERRIDE: &str = "/heatingCircuits/hc1/temporaryRoomSetpoint";
pub const HC_OPERATION_MODE: &str = "/heatingCircuits/hc1/operationMode";
pub const HC_ACTIVE_PROGRAM: &str = "/heatingCircuits/hc1/activeSwitchProgram";
pub const HC_STATUS: &str = "/heatingCircuits/hc1/overallStatus";
pub const HC_COMFORT2_TEMP: &str = "/heatingCircuits/hc1/temperatureLevels/comfort2";
pub const HC_ECO_TEMP: &str = "/heatingCircuits/hc1/temperatureLevels/eco";
pub const HC_MAX_FLOW_TEMP: &str = "/heatingCircuits/hc1/maxFlowTemp";
pub const HC_HEATING_TYPE: &str = "/heatingCircuits/hc1/heatingType";
pub const HC_CONTROL_TYPE: &str = "/heatingCircuits/hc1/controlType";
pub const HC_HEAT_COOL_MODE: &str = "/heatingCircuits/hc1/heatCoolMode";
pub const HC_SUWI_MODE: &str = "/heatingCircuits/hc1/currentSuWiMode";
pub const HC_SUWI_THRESHOLD: &str = "/heatingCircuits/hc1/suWiThreshold";

// Domestic hot water
pub const DHW_ACTUAL_TEMP: &str = "/dhwCircuits/dhw1/actualTemp";
pub const DHW_CURRENT_SETPOINT: &str = "/dhwCircuits/dhw1/currentSetpoint";
pub const DHW_OPERATION_MODE: &str = "/dhwCircuits/dhw1/operationMode";
pub const DHW_STATUS: &str = "/dhwCircuits/dhw1/overallStatus";
pub const DHW_CHARGE: &str = "/dhwCircuits/dhw1/charge";
pub const DHW_CHARGE_DURATION: &str = "/dhwCircuits/dhw1/chargeDuration";
pub const DHW_SINGLE_CHARGE_SETPOINT: &str = "/dhwCircuits/dhw1/singleChargeSetpoint";
pub const DHW_REDUCE_TEMP_ON_ALARM: &str = "/dhwCircuits/dhw1/reduceTempOnAlarm";
pub const DHW_TD_MODE: &str = "/dhwCircuits/dhw1/tdMode";
pub const DHW_TEMP_ECO: &str = "/dhwCircuits/dhw1/temperatureLevels/eco";
pub const DHW_TEMP_HIGH: &str = "/dhwCircuits/dhw1/temperatureLevels/high";
pub const DHW_TEMP_LOW: &str = "/dhwCircuits/dhw1/temperatureLevels/low";

// Heat sources
pub const HS_ACTUAL_MODULATION: &str = "/heatSources/actualModulation";
pub const HS_SUPPLY_TEMP: &str = "/heatSources/actualSupplyTemperature";
pub const HS_RETURN_TEMP: &str = "/heatSources/returnTemperature";
pub const HS_CH_STATUS: &str = "/heatSources/chStatus";
pub const HS_HEAT_DEMAND: &str = "/heatSources/actualHeatDemand";
pub const HS_NUM_STARTS: &str = "/heatSources/numberOfStarts";
pub const HS_TYPE: &str = "/heatSources/hs1/type";
pub const HS_HP_TYPE: &str = "/heatSources/hs1/heatPumpType";
pub const HS_HS1_STARTS: &str = "/heatSources/hs1/numberOfStarts";
pub const HS_STANDBY: &str = "/heatSources/standbyMode";
pub const HS_EM_STATUS: &str = "/heatSources/emStatus";

// System and gateway
pub const SYS_OUTDOOR_TEMP: &str = "/system/sensors/temperatures/outdoor_t1";
pub const SYS_TYPE: &str = "/system/type";
pub const SYS_BRAND: &str = "/system/brand";
pub const GW_FIRMWARE: &str = "/gateway/versionFirmware";
pub const GW_HARDWARE: &str = "/gateway/versionHardware";
pub const GW_IP: &str = "/gateway/wifi/ip/ipv4";
pub const GW_MAC: &str = "/gateway/wifi/mac";
pub const GW_SSID: &str = "/gateway/wifi/ssid";
pub const GW_SERIAL: &str = "/gateway/serialId";
pub const GW_SW_PREFIX: &str = "/gateway/swPrefix";
pub const GW_TIMEZONE: &str = "/gateway/tzInfo/timeZone";
pub const NOTIFICATIONS: &str = "/notifications";

// Energy recordings
pub const REC_TOTAL_COMPRESSOR: &str = "/recordings/heatSources/emon/total/compressor";
pub const REC_TOTAL_EHEATER: &str = "/recordings/heatSources/emon/total/eheater";
pub const REC_TOTAL_OUTPUT: &str = "/recordings/heatSources/emon/total/outputProduced";
pub const REC_CH_COMPRESSOR: &str = "/recordings/heatSources/emon/ch/compressor";
pub const REC_CH_EHEATER: &str = "/recordings/heatSources/emon/ch/eheater";
pub const REC_CH_OUTPUT: &str = "/recordings/heatSources/emon/ch/outputProduced";
pub const REC_DHW_COMPRESSOR: &str = "/recordings/heatSources/emon/dhw/compressor";
pub const REC_DHW_EHEATER: &str = "/recordings/heatSources/emon/dhw/eheater";
pub const REC_DHW_OUTPUT: &str = "/recordings/heatSources/emon/dhw/outputProduced";

// Variable tariff
pub const VT_CH_OPTIMIZATION: &str = "/system/variableTariff/ch/optimization";
pub const VT_CH_HIGH_DELTA: &str = "/system/variableTariff/ch/highPriceDelta";
pub const VT_CH_LOW_DELTA: &str = "/system/variableTariff/ch/lowPriceDelta";
pub const VT_CH_MID_SETPOINT: &str = "/system/variableTariff/ch/midPriceSetpoint";
pub const VT_DHW_OPTIMIZATION: &str = "/system/variableTariff/dhw/optimization";
pub const VT_DHW_HIGH_ENABLE: &str = "/system/variableTariff/dhw/highPriceEnable";
pub const VT_DHW_LOW_ENABLE: &str = "/system/variableTariff/dhw/lowPriceEnable";

/// Values the gateway reports for a disconnected or missing sensor.
const SENTINELS: &[f64] = &[32767.0, -32768.0];

pub fn is_sentinel(v: f64) -> bool {
    SENTINELS.contains(&v)
}

pub fn resource_url(api_base: &str, device_id: &str, path: &str) -> String {
    let base = api_base.trim_end_matches('/');
    format!("{base}/{device_id}/resource{path}")
}

pub fn put_body(value: &Value) -> Value {
    json!({ "value": value })
}

/// SingleKey ID login URL for the interactive authorization-code flow.
pub fn authorization_url() -> String {
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(CODE_VERIFIER.as_bytes()));
    let scope = SCOPES.join(" ");
    let redirect = urlencoding::encode(REDIRECT_URI);
    let scope = urlencoding::encode(&scope);
    let params: [(&str, &str); 11] = [
        ("redirect_uri", redirect.as_ref()),
        ("client_id", CLIENT_ID),
        ("response_type", "code"),
        ("prompt", "login"),
        ("state", "_yUmSV3AjUTXfn6DSZQZ-g"),
        ("nonce", "5iiIvx5_9goDrYwxxUEorQ"),
        ("scope", scope.as_ref()),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
        ("style_id", "tt_bsch"),
        ("suppressed_prompt", "login"),
    ];
    let inner = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{LOGIN_URL}?ReturnUrl={}{}",
        urlencoding::encode(AUTHORIZE_CALLBACK),
        urlencoding::encode(&inner)
    )
}

/// Pull the `code` query parameter out of the app redirect the browser lands on.
pub fn extract_code(redirect_url: &str) -> Option<String> {
    let url = Url::parse(redirect_url.trim()).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .filter(|c| !c.is_empty())
}

pub fn code_exchange_form(code: &str) -> Vec<(String, String)> {
    vec![
        ("grant_type".into(), "authorization_code".into()),
        ("code".into(), code.into()),
        ("redirect_uri".into(), REDIRECT_URI.into()),
        ("client_id".into(), CLIENT_ID.into()),
        ("code_verifier".into(), CODE_VERIFIER.into()),
    ]
}

pub fn refresh_form(refresh_token: &str) -> Vec<(String, String)> {
    vec![
        ("grant_type".into(), "refresh_token".into()),
        ("refresh_token".into(), refresh_token.into()),
        ("client_id".into(), CLIENT_ID.into()),
    ]
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Reads the `exp` claim of a JWT access token without verifying it.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}
