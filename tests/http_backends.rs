use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tts_cascade::engines::gtts::GttsBackend;
use tts_cascade::engines::openai::OpenAiSpeechBackend;
use tts_cascade::{BackendError, Rate, SpeechBackend};

fn audio(body: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "audio/mpeg")
        .set_body_bytes(body.to_vec())
}

#[tokio::test]
async fn gtts_concatenates_chunks_in_order() {
    let server = MockServer::start().await;
    for (idx, body) in [("0", b"AAA"), ("1", b"BBB"), ("2", b"CCC")] {
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("tl", "ur"))
            .and(query_param("total", "3"))
            .and(query_param("idx", idx))
            .respond_with(audio(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    // 50 four-letter words: three chunks of at most 100 characters.
    let text = vec!["abcd"; 50].join(" ");
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("long.mp3");
    let written = GttsBackend::new(server.uri())
        .generate(&text, "ur", Rate::default(), &out)
        .await
        .unwrap();

    assert_eq!(written, out);
    assert_eq!(std::fs::read(&out).unwrap(), b"AAABBBCCC");
}

#[tokio::test]
async fn gtts_slow_rate_requests_slow_speech() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translate_tts"))
        .and(query_param("ttsspeed", "0.3"))
        .respond_with(audio(b"ID3slow"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    GttsBackend::new(server.uri())
        .generate("hello", "en", Rate::Percent(-50), &dir.path().join("a.mp3"))
        .await
        .unwrap();
}

#[tokio::test]
async fn gtts_http_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translate_tts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend overloaded"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = GttsBackend::new(server.uri())
        .generate("hello", "en", Rate::default(), &dir.path().join("a.mp3"))
        .await
        .unwrap_err();

    assert!(matches!(&err, BackendError::Transient { backend, .. } if backend == "gtts"));
    assert!(err.to_string().contains("500"), "{err}");
}

#[tokio::test]
async fn gtts_rejects_html_payloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translate_tts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html>captcha</html>", "text/html; charset=UTF-8"),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("a.mp3");
    let err = GttsBackend::new(server.uri())
        .generate("hello", "en", Rate::default(), &out)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("text/html"), "{err}");
    assert!(!out.exists());
}

#[tokio::test]
async fn openai_posts_speech_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "tts-1",
            "input": "hello world",
            "voice": "alloy",
            "response_format": "mp3",
        })))
        .respond_with(audio(b"ID3openai"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("speech.mp3");
    OpenAiSpeechBackend::new(Some("test-key".to_string()), server.uri())
        .generate("hello world", "alloy", Rate::default(), &out)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&out).unwrap(), b"ID3openai");
}

#[tokio::test]
async fn openai_surfaces_api_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = OpenAiSpeechBackend::new(Some("bad".to_string()), server.uri())
        .generate("hello", "alloy", Rate::default(), &dir.path().join("a.mp3"))
        .await
        .unwrap_err();

    let text = err.to_string();
    assert!(text.contains("401"), "{text}");
    assert!(text.contains("Incorrect API key provided"), "{text}");
}
