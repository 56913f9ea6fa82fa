//! In-memory platform doubles shared by the crawl tests

use crate::normalize::RawValue;
use crate::platform::{
    Credentials, ItemStream, PlatformClient, PlatformConnector, PlatformError, PlatformResult,
    RawActor, RawPost, RawPostMetrics, Target,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn post(id: &str, timestamp: i64, author: Option<&str>) -> RawPost {
    RawPost {
        id: id.to_string(),
        author_id: author.map(str::to_string),
        author_name: None,
        timestamp: Some(timestamp),
        text: Some(format!("post {}", id)),
        metrics: RawPostMetrics {
            views: Some(10),
            likes: Some(1),
            replies: None,
            shares: None,
        },
        extra: RawValue::object([("_", RawValue::Str("Message".into()))]),
    }
}

pub fn actor(id: &str, handle: Option<&str>) -> RawActor {
    RawActor {
        id: id.to_string(),
        handle: handle.map(str::to_string),
        display_name: None,
        created_at: None,
        counts: Default::default(),
        extra: RawValue::Null,
    }
}

/// Serves canned data for every target
#[derive(Default)]
pub struct MockClient {
    profile: Option<RawActor>,
    posts: Vec<RawPost>,
    members: Vec<RawActor>,
    followings: Vec<RawActor>,
    known_members: HashMap<String, RawActor>,
    posts_error: Option<String>,
    since: Mutex<Vec<Option<i64>>>,
    lookups: Mutex<Vec<String>>,
    crawled: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn with_profile(mut self, profile: RawActor) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_posts(mut self, posts: Vec<RawPost>) -> Self {
        self.posts = posts;
        self
    }

    pub fn with_members(mut self, members: Vec<RawActor>) -> Self {
        self.members = members;
        self
    }

    pub fn with_followings(mut self, followings: Vec<RawActor>) -> Self {
        self.followings = followings;
        self
    }

    pub fn with_known_member(mut self, member: RawActor) -> Self {
        self.known_members.insert(member.id.clone(), member);
        self
    }

    /// Every posts request fails with `message`
    pub fn failing_posts(mut self, message: &str) -> Self {
        self.posts_error = Some(message.to_string());
        self
    }

    pub fn posts_since(&self) -> Vec<Option<i64>> {
        self.since.lock().unwrap().clone()
    }

    pub fn member_lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    /// Handles whose posts were requested, in order
    pub fn crawled(&self) -> Vec<String> {
        self.crawled.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    async fn fetch_profile(&self, target: &Target) -> PlatformResult<RawActor> {
        self.profile
            .clone()
            .ok_or_else(|| PlatformError::NotFound(target.handle.clone()))
    }

    fn fetch_posts<'a>(
        &'a self,
        target: &'a Target,
        since: Option<i64>,
    ) -> ItemStream<'a, RawPost> {
        self.since.lock().unwrap().push(since);
        self.crawled.lock().unwrap().push(target.handle.clone());

        if let Some(message) = &self.posts_error {
            let error = PlatformError::Api {
                status: 420,
                message: message.clone(),
            };
            return stream::once(async move { Err(error) }).boxed();
        }
        stream::iter(self.posts.clone().into_iter().map(Ok)).boxed()
    }

    fn fetch_members<'a>(&'a self, _target: &'a Target) -> ItemStream<'a, RawActor> {
        stream::iter(self.members.clone().into_iter().map(Ok)).boxed()
    }

    fn fetch_followings<'a>(&'a self, _target: &'a Target) -> ItemStream<'a, RawActor> {
        stream::iter(self.followings.clone().into_iter().map(Ok)).boxed()
    }

    async fn fetch_member(
        &self,
        _target: &Target,
        user_id: &str,
    ) -> PlatformResult<Option<RawActor>> {
        self.lookups.lock().unwrap().push(user_id.to_string());
        Ok(self.known_members.get(user_id).cloned())
    }
}

/// Hands out one pre-built client per slot; password "bad" is rejected
#[derive(Default)]
pub struct MockConnector {
    clients: HashMap<usize, Arc<MockClient>>,
    authenticated: Mutex<Vec<usize>>,
}

impl MockConnector {
    pub fn with_client(mut self, slot: usize, client: Arc<MockClient>) -> Self {
        self.clients.insert(slot, client);
        self
    }

    pub fn authenticated(&self) -> Vec<usize> {
        let mut slots = self.authenticated.lock().unwrap().clone();
        slots.sort_unstable();
        slots
    }
}

#[async_trait]
impl PlatformConnector for MockConnector {
    async fn authenticate(
        &self,
        slot: usize,
        credentials: &Credentials,
    ) -> PlatformResult<Arc<dyn PlatformClient>> {
        if credentials.password == "bad" {
            return Err(PlatformError::Auth(format!("{} is banned", credentials.username)));
        }
        self.authenticated.lock().unwrap().push(slot);
        let client: Arc<dyn PlatformClient> = self.clients.get(&slot).cloned().unwrap_or_default();
        Ok(client)
    }
}
