//! Fetch, normalize and upsert for one target

use crate::crawl::documents::{actor_ref, DocumentBuilder};
use crate::normalize::RawValue;
use crate::platform::{PlatformClient, StreamKind, Target};
use crate::store::{Document, DocumentStore, Filter, MergePolicy, ID_FIELD};
use crate::window::{Admission, Paginator, WindowTracker};
use crate::HarvestResult;
use futures::TryStreamExt;
use std::collections::{BTreeMap, BTreeSet};

/// Documents are flushed to the store in batches of this size
pub const UPSERT_BATCH: usize = 100;

/// What one target run wrote, per stream kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetReport {
    pub written: BTreeMap<StreamKind, usize>,
}

impl TargetReport {
    pub fn documents(&self) -> usize {
        self.written.values().sum()
    }
}

/// Runs the requested stream kinds for targets of one session
pub struct TargetPipeline<'a> {
    client: &'a dyn PlatformClient,
    store: &'a dyn DocumentStore,
    window: &'a WindowTracker,
    stream_kinds: &'a [StreamKind],
    limit: Option<usize>,
}

impl<'a> TargetPipeline<'a> {
    pub fn new(
        client: &'a dyn PlatformClient,
        store: &'a dyn DocumentStore,
        window: &'a WindowTracker,
        stream_kinds: &'a [StreamKind],
        limit: Option<usize>,
    ) -> Self {
        Self {
            client,
            store,
            window,
            stream_kinds,
            limit,
        }
    }

    /// Crawls every requested stream of `target`, stopping at the first error
    ///
    /// Each stream reads its cutoff and advances its crawl state before any of
    /// its data is written.
    pub async fn run(&self, target: &Target, now: i64) -> HarvestResult<TargetReport> {
        let mut report = TargetReport::default();

        for &kind in self.stream_kinds {
            let cutoff = self.window.get_cutoff(target, kind)?;
            self.window.mark_run_start(target, kind, now)?;
            let builder = DocumentBuilder::new(target, now, self.window.period());

            let written = match kind {
                StreamKind::Profiles => self.profile(target, &builder).await?,
                StreamKind::Posts => self.posts(target, cutoff, &builder).await?,
                StreamKind::Members => self.members(target, &builder).await?,
                StreamKind::Followings => self.followings(target, &builder).await?,
                StreamKind::Authors => self.authors(target, cutoff, &builder).await?,
                StreamKind::Announcements => self.announcements(target).await?,
            };

            tracing::info!(
                handle = %target,
                stream = %kind,
                cutoff = ?cutoff,
                written,
                "Stream crawled"
            );
            report.written.insert(kind, written);
        }

        Ok(report)
    }

    async fn profile(&self, target: &Target, builder: &DocumentBuilder<'_>) -> HarvestResult<usize> {
        let profile = self.client.fetch_profile(target).await?;
        let document = builder.actor(&profile);
        let written = self.upsert(
            &target.platform.actors_collection(),
            &[document],
            MergePolicy::MergeSubmaps,
        )?;

        if !profile.counts.is_empty() {
            self.window.record_counters(
                target,
                StreamKind::Profiles,
                &profile.counts,
                builder.now(),
            )?;
        }
        Ok(written)
    }

    async fn posts(
        &self,
        target: &Target,
        cutoff: Option<i64>,
        builder: &DocumentBuilder<'_>,
    ) -> HarvestResult<usize> {
        let collection = target.platform.posts_collection();
        let mut paginator = Paginator::new(cutoff, self.limit);
        let mut posts = self.client.fetch_posts(target, cutoff);
        let mut batch = Vec::new();
        let mut written = 0;

        while let Some(post) = posts.try_next().await? {
            if paginator.admit(post.timestamp) == Admission::Stop {
                break;
            }
            batch.push(builder.post(&post));
            if batch.len() >= UPSERT_BATCH {
                written += self.upsert(&collection, &batch, MergePolicy::MergeSubmaps)?;
                batch.clear();
            }
        }

        written += self.upsert(&collection, &batch, MergePolicy::MergeSubmaps)?;
        Ok(written)
    }

    /// Members and their `{member}_{target}` edges
    async fn members(&self, target: &Target, builder: &DocumentBuilder<'_>) -> HarvestResult<usize> {
        let actors_collection = target.platform.actors_collection();
        let edges_collection = target.platform.relationships_collection();
        let mut paginator = Paginator::new(None, self.limit);
        let mut members = self.client.fetch_members(target);
        let mut actors = Vec::new();
        let mut edges = Vec::new();
        let mut written = 0;

        while let Some(member) = members.try_next().await? {
            if paginator.admit(None) == Admission::Stop {
                break;
            }
            actors.push(builder.actor(&member));
            edges.push(builder.relationship(&actor_ref(&member), &target.handle));

            if actors.len() >= UPSERT_BATCH {
                written += self.upsert(&actors_collection, &actors, MergePolicy::MergeSubmaps)?;
                self.upsert(&edges_collection, &edges, MergePolicy::MergeSubmaps)?;
                actors.clear();
                edges.clear();
            }
        }

        written += self.upsert(&actors_collection, &actors, MergePolicy::MergeSubmaps)?;
        self.upsert(&edges_collection, &edges, MergePolicy::MergeSubmaps)?;
        Ok(written)
    }

    /// Followed accounts, `{target}_{followed}` edges and the summary document
    async fn followings(
        &self,
        target: &Target,
        builder: &DocumentBuilder<'_>,
    ) -> HarvestResult<usize> {
        let mut paginator = Paginator::new(None, self.limit);
        let mut followings = self.client.fetch_followings(target);
        let mut actors = Vec::new();
        let mut edges = Vec::new();
        let mut names = Vec::new();

        while let Some(followed) = followings.try_next().await? {
            if paginator.admit(None) == Admission::Stop {
                break;
            }
            let name = actor_ref(&followed);
            actors.push(builder.actor(&followed));
            edges.push(builder.relationship(&target.handle, &name));
            names.push(name);
        }

        let written = self.upsert(
            &target.platform.actors_collection(),
            &actors,
            MergePolicy::MergeSubmaps,
        )?;
        self.upsert(
            &target.platform.relationships_collection(),
            &edges,
            MergePolicy::MergeSubmaps,
        )?;
        self.upsert(
            &target.platform.followings_collection(),
            &[builder.followings_summary(names)],
            MergePolicy::Replace,
        )?;
        Ok(written)
    }

    /// Fetches authors of stored posts newer than the cutoff that have no
    /// actor document yet
    async fn authors(
        &self,
        target: &Target,
        cutoff: Option<i64>,
        builder: &DocumentBuilder<'_>,
    ) -> HarvestResult<usize> {
        let actors_collection = target.platform.actors_collection();
        let mut filter = Filter::all()
            .eq("target", target.handle.as_str())
            .exists("authorId", true)
            .ne("authorId", serde_json::Value::Null);
        if let Some(cutoff) = cutoff {
            filter = filter.gte("timestamp", cutoff);
        }

        let posts = self.store.find(
            &target.platform.posts_collection(),
            &filter,
            Some(&["authorId"]),
        )?;
        let authors: BTreeSet<String> = posts
            .iter()
            .filter_map(|post| post.get("authorId").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect();

        let mut paginator = Paginator::new(None, self.limit);
        let mut fetched = Vec::new();
        for author in authors {
            if self
                .store
                .get(&actors_collection, &builder.scoped_id(&author))?
                .is_some()
            {
                continue;
            }
            if paginator.admit(None) == Admission::Stop {
                break;
            }
            match self.client.fetch_member(target, &author).await? {
                Some(actor) => fetched.push(builder.actor(&actor)),
                None => tracing::debug!(handle = %target, author = %author, "Author not found"),
            }
        }

        self.upsert(&actors_collection, &fetched, MergePolicy::MergeSubmaps)
    }

    /// Flags every stored post of a broadcast channel or gigagroup
    async fn announcements(&self, target: &Target) -> HarvestResult<usize> {
        let profile = self.client.fetch_profile(target).await?;
        let announcement =
            is_flag_set(&profile.extra, "broadcast") || is_flag_set(&profile.extra, "gigagroup");

        let collection = target.platform.posts_collection();
        let posts = self.store.find(
            &collection,
            &Filter::all().eq("target", target.handle.as_str()),
            Some(&[ID_FIELD]),
        )?;

        let mut written = 0;
        for chunk in posts.chunks(UPSERT_BATCH) {
            let updates: Vec<Document> = chunk
                .iter()
                .filter_map(|post| post.get(ID_FIELD).cloned())
                .map(|id| {
                    let mut update = Document::new();
                    update.insert(ID_FIELD.to_string(), id);
                    update.insert("announcement".to_string(), announcement.into());
                    update
                })
                .collect();
            written += self.upsert(&collection, &updates, MergePolicy::MergeSubmaps)?;
        }

        tracing::debug!(handle = %target, announcement, posts = written, "Announcement flag applied");
        Ok(written)
    }

    fn upsert(
        &self,
        collection: &str,
        documents: &[Document],
        policy: MergePolicy,
    ) -> HarvestResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        Ok(self.store.upsert(collection, documents, policy)?)
    }
}

fn is_flag_set(extra: &RawValue, key: &str) -> bool {
    matches!(extra.get(key), Some(RawValue::Bool(true)))
}
