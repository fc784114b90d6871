use conductor_core::{Message, ProviderError};
use conductor_providers::{CompletionRequest, OpenAIProvider, Provider};
use futures::StreamExt;

fn provider(url: &str) -> OpenAIProvider {
    OpenAIProvider::new("sk-test")
        .with_base_url(url)
        .with_default_model("qwen-flash")
}

#[tokio::test]
async fn test_complete_posts_chat_completion() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"model":"qwen-flash","stream":false}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"sub_tasks\":[]}"},"finish_reason":"stop"}]}"#,
        )
        .create_async()
        .await;

    let request = CompletionRequest::new(vec![Message::user("hi")]).with_system("be terse");
    let response = provider(&server.url()).complete(request).await.unwrap();

    assert_eq!(response.content, "{\"sub_tasks\":[]}");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_complete_surfaces_api_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body("invalid api key")
        .create_async()
        .await;

    let err = provider(&server.url())
        .complete(CompletionRequest::new(vec![Message::user("hi")]))
        .await
        .unwrap_err();

    match err.downcast_ref::<ProviderError>() {
        Some(ProviderError::ApiError { status, message, .. }) => {
            assert_eq!(*status, 401);
            assert_eq!(message, "invalid api key");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_yields_deltas_until_done() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let mut stream = provider(&server.url())
        .complete_stream(CompletionRequest::new(vec![Message::user("hi")]))
        .await
        .unwrap();

    let mut text = String::new();
    let mut saw_final = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        if let Some(delta) = chunk.delta {
            text.push_str(&delta);
        }
        saw_final |= chunk.is_final;
    }

    assert_eq!(text, "Hello");
    assert!(saw_final);
}
