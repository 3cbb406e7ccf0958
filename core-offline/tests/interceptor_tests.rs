//! Request-path caching and generation rollover.

mod common;

use bridge_desktop::FsCacheStorage;
use bridge_traits::{CacheStorage, HttpRequest, HttpResponse};
use common::{audio_response, Fixture, MockHttpClient, GENERATION};
use core_offline::{AudioInterceptor, InterceptorState, OfflineLibraryManager, Track};
use core_runtime::config::OfflineConfig;
use core_runtime::events::{CoreEvent, EventBus, InterceptorEvent};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_miss_then_hit_fetches_once() {
    let fixture = Fixture::new().await;
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .times(1)
        .returning(|req| Ok(audio_response(&req.url)));

    let interceptor = AudioInterceptor::new(&fixture.config(Arc::new(http)), EventBus::default());
    interceptor.start().await.unwrap();

    let url = "https://media.example.net/lesson.mp3";
    let first = interceptor.handle_fetch(HttpRequest::get(url)).await.unwrap();
    let second = interceptor.handle_fetch(HttpRequest::get(url)).await.unwrap();

    assert_eq!(first.body, second.body);
    assert_eq!(fixture.cache_keys().await, vec![url]);
}

#[tokio::test]
async fn test_non_audio_requests_pass_through_uncached() {
    let fixture = Fixture::new().await;
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .times(2)
        .returning(|_| Ok(HttpResponse::ok("{}")));

    let interceptor = AudioInterceptor::new(&fixture.config(Arc::new(http)), EventBus::default());
    interceptor.start().await.unwrap();

    let url = "https://api.example.net/tracks.json";
    interceptor.handle_fetch(HttpRequest::get(url)).await.unwrap();
    interceptor.handle_fetch(HttpRequest::get(url)).await.unwrap();

    assert!(fixture.cache_keys().await.is_empty());
}

#[tokio::test]
async fn test_error_responses_are_returned_but_not_cached() {
    let fixture = Fixture::new().await;
    let mut http = MockHttpClient::new();
    http.expect_execute().times(2).returning(|_| {
        Ok(HttpResponse {
            status: 503,
            ..HttpResponse::ok("busy")
        })
    });

    let interceptor = AudioInterceptor::new(&fixture.config(Arc::new(http)), EventBus::default());
    interceptor.start().await.unwrap();

    let url = "https://media.example.net/busy.mp3";
    assert_eq!(interceptor.handle_fetch(HttpRequest::get(url)).await.unwrap().status, 503);
    assert_eq!(interceptor.handle_fetch(HttpRequest::get(url)).await.unwrap().status, 503);
    assert!(fixture.cache_keys().await.is_empty());
}

#[tokio::test]
async fn test_entry_cached_by_interceptor_is_not_offline() {
    let fixture = Fixture::new().await;
    let mut http = MockHttpClient::new();
    http.expect_execute()
        .times(1)
        .returning(|req| Ok(audio_response(&req.url)));
    let config = fixture.config(Arc::new(http));

    let interceptor = AudioInterceptor::new(&config, EventBus::default());
    interceptor.start().await.unwrap();
    let manager = OfflineLibraryManager::load(&config, EventBus::default()).await.unwrap();

    let track = Track::new(20u64, "https://media.example.net/20.mp3");
    interceptor
        .handle_fetch(HttpRequest::get("https://media.example.net/20.mp3"))
        .await
        .unwrap();

    assert_eq!(fixture.cache_keys().await.len(), 1);
    assert!(!manager.is_track_offline(&track.id));
}

#[tokio::test]
async fn test_new_generation_purges_old_one_on_disk() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::new().await;
    let storage: Arc<dyn CacheStorage> = Arc::new(FsCacheStorage::new(dir.path().to_path_buf()));

    let mut http = MockHttpClient::new();
    http.expect_execute()
        .returning(|req| Ok(audio_response(&req.url)));
    let http = Arc::new(http);

    let config_for = |generation: &str| -> OfflineConfig {
        fixture
            .builder(http.clone())
            .cache_storage(storage.clone())
            .cache_generation(generation)
            .build()
            .unwrap()
    };

    let old = AudioInterceptor::new(&config_for("offline-audio-v0"), EventBus::default());
    old.start().await.unwrap();
    old.handle_fetch(HttpRequest::get("https://media.example.net/old.mp3"))
        .await
        .unwrap();

    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let new = AudioInterceptor::new(&config_for(GENERATION), bus);
    new.install().await.unwrap();

    // Old generation stays readable until activation.
    assert!(storage.has("offline-audio-v0").await.unwrap());

    old.retire();
    let removed = new.activate().await.unwrap();

    assert_eq!(removed, vec!["offline-audio-v0".to_string()]);
    assert_eq!(storage.keys().await.unwrap(), vec![GENERATION.to_string()]);
    assert_eq!(old.state(), InterceptorState::Redundant);
    assert_eq!(new.state(), InterceptorState::Active);
    assert!(new.has_claimed_clients());

    let mut seen = Vec::new();
    while let Ok(CoreEvent::Interceptor(event)) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(InterceptorEvent::Installed { .. })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, InterceptorEvent::Activated { removed_generations, .. } if removed_generations.len() == 1)));
}
