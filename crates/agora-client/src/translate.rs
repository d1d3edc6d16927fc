use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use agora_types::models::Message;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Target language for readers of a given nationality. Defaults to English.
pub fn language_code(nationality: &str) -> &'static str {
    match nationality {
        "Germany" => "de",
        "United Kingdom" | "United States" | "Canada" => "en",
        "France" => "fr",
        "Spain" | "Mexico" => "es",
        "Italy" => "it",
        "Netherlands" => "nl",
        "Poland" => "pl",
        "Greece" => "el",
        "Portugal" | "Brazil" => "pt",
        "Sweden" => "sv",
        "Denmark" => "da",
        "Norway" => "no",
        "Finland" => "fi",
        "Japan" => "ja",
        "China" => "zh",
        "Russia" => "ru",
        "India" => "hi",
        "Bulgaria" => "bg",
        _ => "en",
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

/// Client for a Google Translate v2 style endpoint.
#[derive(Clone)]
pub struct Translator {
    http: reqwest::Client,
    url: String,
    key: Option<String>,
}

impl Translator {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.translate_url.clone(),
            key: config.translate_key.clone(),
        }
    }

    /// Translate `text` for a reader of `nationality`. Any failure is logged
    /// and the original text is returned.
    pub async fn translate(&self, text: &str, nationality: &str) -> String {
        let target = language_code(nationality);
        match self.request(text, target).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("Translation to {} failed: {}", target, e);
                text.to_string()
            }
        }
    }

    /// Translate every message's text concurrently, keeping order.
    pub async fn translate_messages(&self, messages: &[Message], nationality: &str) -> Vec<Message> {
        let texts = join_all(messages.iter().map(|m| self.translate(&m.text, nationality))).await;
        messages
            .iter()
            .zip(texts)
            .map(|(m, text)| Message { text, ..m.clone() })
            .collect()
    }

    async fn request(&self, text: &str, target: &str) -> Result<String> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| ClientError::Config("AGORA_TRANSLATE_KEY is not set".into()))?;

        debug!("Translating {} chars to {}", text.len(), target);
        let response: TranslateResponse = self
            .http
            .post(&self.url)
            .query(&[("key", key)])
            .json(&TranslateRequest { q: text, target })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| ClientError::NotFound("translation in response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Json, Query};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use chrono::Utc;
    use serde::Deserialize;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    const PATH: &str = "/language/translate/v2";

    #[derive(Deserialize)]
    struct KeyParam {
        key: String,
    }

    #[derive(Deserialize)]
    struct TranslateBody {
        q: String,
        target: String,
    }

    /// Stand-in for the translation API: answers `<target>:<q>`, and
    /// rejects calls without the `key` query parameter.
    async fn tag_with_target(
        Query(params): Query<KeyParam>,
        Json(body): Json<TranslateBody>,
    ) -> std::result::Result<Json<Value>, StatusCode> {
        if params.key.is_empty() {
            return Err(StatusCode::FORBIDDEN);
        }
        let text = format!("{}:{}", body.target, body.q);
        Ok(Json(json!({ "data": { "translations": [{ "translatedText": text }] } })))
    }

    async fn no_translations() -> Json<Value> {
        Json(json!({ "data": { "translations": [] } }))
    }

    /// Serve `app` on an ephemeral port and return the endpoint URL.
    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}{}", addr, PATH)
    }

    async fn translation_api() -> String {
        serve(Router::new().route(PATH, post(tag_with_target))).await
    }

    fn translator(url: String, key: Option<&str>) -> Translator {
        let config = ClientConfig {
            translate_url: url,
            translate_key: key.map(String::from),
            ..ClientConfig::default()
        };
        Translator::new(&config)
    }

    #[test]
    fn maps_nationality_to_language() {
        assert_eq!(language_code("Germany"), "de");
        assert_eq!(language_code("Brazil"), "pt");
        assert_eq!(language_code("Atlantis"), "en");
    }

    #[tokio::test]
    async fn sends_text_and_target_language() {
        let translator = translator(translation_api().await, Some("k"));
        assert_eq!(translator.translate("hello", "Germany").await, "de:hello");
    }

    #[tokio::test]
    async fn translates_messages_in_order() {
        let translator = translator(translation_api().await, Some("k"));
        let messages: Vec<Message> = ["one", "two"]
            .into_iter()
            .enumerate()
            .map(|(i, text)| Message {
                id: format!("m{}", i),
                stream_id: "C1".into(),
                sender_id: "U1".into(),
                text: text.into(),
                username: None,
                created_at: Utc::now(),
            })
            .collect();

        let translated = translator.translate_messages(&messages, "Spain").await;
        let texts: Vec<&str> = translated.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["es:one", "es:two"]);
        assert_eq!(translated[0].id, "m0");
    }

    #[tokio::test]
    async fn falls_back_to_original_text() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let unreachable = translator(format!("http://{}{}", addr, PATH), Some("k"));
        assert_eq!(unreachable.translate("hello", "France").await, "hello");

        let keyless = translator(translation_api().await, None);
        assert_eq!(keyless.translate("hello", "France").await, "hello");

        let refused = translator(translation_api().await, Some(""));
        assert_eq!(refused.translate("hello", "France").await, "hello");

        let empty = serve(Router::new().route(PATH, post(no_translations))).await;
        assert_eq!(translator(empty, Some("k")).translate("hi", "Italy").await, "hi");
    }
}
