use serde::{Deserialize, Deserializer, Serialize};

use crate::{ContactId, CoreError};

/// Incoming identify call: any combination of email and phone number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone_number: Option<String>,
}

impl IdentifyRequest {
    pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Self {
        Self {
            email: email.map(str::to_string),
            phone_number: phone_number.map(str::to_string),
        }
    }

    /// Treat empty strings as absent and reject a request carrying neither.
    /// Values are otherwise kept byte for byte.
    pub fn normalized(self) -> Result<Self, CoreError> {
        let email = non_empty(self.email);
        let phone_number = non_empty(self.phone_number);
        if email.is_none() && phone_number.is_none() {
            return Err(CoreError::InvalidRequest(
                "email or phoneNumber must be provided".into(),
            ));
        }
        Ok(Self { email, phone_number })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<StringOrNumber> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        StringOrNumber::Text(s) => s,
        StringOrNumber::Signed(n) => n.to_string(),
        StringOrNumber::Unsigned(n) => n.to_string(),
    }))
}

/// The consolidated identity returned by an identify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_emails: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_phone_numbers: Option<Vec<String>>,
}

impl IdentityView {
    /// Drop the per-secondary breakdown so only the four core fields serialize.
    pub fn without_secondary_details(mut self) -> Self {
        self.secondary_emails = None;
        self.secondary_phone_numbers = None;
        self
    }
}
