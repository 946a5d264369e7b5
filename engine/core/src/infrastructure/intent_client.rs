// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Intent Oracle Adapter
//
// Anti-Corruption Layer for the external NLU/LLM intent-extraction service.
// The engine never performs its own NLP; this client ships the utterance
// plus conversation context and maps the loosely-typed response into the
// closed ExtractedIntent variant at the boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::dialogue::{
    DialogueContext, ExtractedIntent, IntentExtractionError, IntentExtractor, IntentKind, SlotName,
};

pub struct HttpIntentExtractor {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    message: &'a str,
    context: &'a DialogueContext,
}

#[derive(Deserialize)]
struct ExtractResponse {
    intent: String,
    #[serde(default)]
    fields: HashMap<String, String>,
    #[serde(default)]
    confidence: f64,
}

impl HttpIntentExtractor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl IntentExtractor for HttpIntentExtractor {
    async fn extract(
        &self,
        message: &str,
        context: &DialogueContext,
    ) -> Result<ExtractedIntent, IntentExtractionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExtractRequest { message, context })
            .send()
            .await
            .map_err(|e| IntentExtractionError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(IntentExtractionError::Request(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| IntentExtractionError::MalformedResponse(e.to_string()))?;

        // Unknown intent tags and field names degrade at the boundary
        // instead of failing the turn.
        let mut fields = HashMap::new();
        for (name, value) in body.fields {
            if let Some(slot) = SlotName::parse(&name) {
                fields.insert(slot, value);
            }
        }

        Ok(ExtractedIntent {
            intent: IntentKind::parse(&body.intent),
            fields,
            confidence: body.confidence,
        })
    }
}

/// Stand-in for deployments without an intent endpoint; the dialogue
/// surface then reports extraction unavailable.
pub struct NullIntentExtractor;

#[async_trait]
impl IntentExtractor for NullIntentExtractor {
    async fn extract(
        &self,
        _message: &str,
        _context: &DialogueContext,
    ) -> Result<ExtractedIntent, IntentExtractionError> {
        Err(IntentExtractionError::Unavailable(
            "no intent endpoint configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dialogue::SessionState;

    fn context() -> DialogueContext {
        DialogueContext {
            state: SessionState::Collecting,
            missing_fields: vec![SlotName::Phone, SlotName::Description],
        }
    }

    #[tokio::test]
    async fn test_extract_maps_response_into_closed_variants() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/extract")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "intent": "add_store",
                    "fields": {"name": "Iya Moria", "mood": "hungry"},
                    "confidence": 0.92
                }"#,
            )
            .create_async()
            .await;

        let extractor = HttpIntentExtractor::new(format!("{}/extract", server.url()));
        let intent = extractor.extract("add Iya Moria", &context()).await.unwrap();

        assert_eq!(intent.intent, IntentKind::AddStore);
        assert_eq!(intent.fields.get(&SlotName::Name).map(String::as_str), Some("Iya Moria"));
        // unknown field names are dropped at the boundary
        assert_eq!(intent.fields.len(), 1);
        assert!((intent.confidence - 0.92).abs() < f64::EPSILON);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_intent_degrades_to_unknown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/extract")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"intent": "order_pizza"}"#)
            .create_async()
            .await;

        let extractor = HttpIntentExtractor::new(format!("{}/extract", server.url()));
        let intent = extractor.extract("pizza please", &context()).await.unwrap();
        assert_eq!(intent.intent, IntentKind::Unknown);
        assert!(intent.fields.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_a_request_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/extract")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let extractor = HttpIntentExtractor::new(format!("{}/extract", server.url()));
        let err = extractor.extract("hello", &context()).await.unwrap_err();
        assert!(matches!(err, IntentExtractionError::Request(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/extract")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("not json")
            .create_async()
            .await;

        let extractor = HttpIntentExtractor::new(format!("{}/extract", server.url()));
        let err = extractor.extract("hello", &context()).await.unwrap_err();
        assert!(matches!(err, IntentExtractionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_null_extractor_is_unavailable() {
        let err = NullIntentExtractor
            .extract("hello", &context())
            .await
            .unwrap_err();
        assert!(matches!(err, IntentExtractionError::Unavailable(_)));
    }
}
