pub mod chat_openai;
pub mod dify;
mod target;

pub use target::{AppVariant, ProxyTarget};

use faststr::FastStr;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug)]
pub struct RequestData {
    pub url:     FastStr,
    pub headers: HashMap<FastStr, FastStr>,
    pub body:    Value,
}

impl RequestData {
    pub fn new<T>(url: T, body: Value) -> Self
    where
        T: Into<FastStr>,
    {
        Self {
            url: url.into(),
            headers: Default::default(),
            body,
        }
    }

    pub fn bearer_auth<T>(&mut self, auth: T)
    where
        T: Into<FastStr>,
    {
        self.headers.insert(
            "authorization".into(),
            format!("Bearer {}", auth.into()).into(),
        );
    }
}

pub(crate) fn request_builder(
    request_data: RequestData,
    client: &reqwest::Client,
) -> reqwest::RequestBuilder {
    let RequestData { url, body, headers } = request_data;
    let mut builder = client.post(url.as_str());
    for (k, v) in headers {
        builder = builder.header(k.as_str(), v.as_str());
    }
    builder = builder.json(&body);
    builder
}
