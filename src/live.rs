//! Live group page: four subscriptions feeding one derived view.

use std::sync::Arc;

use serde::Serialize;

use crate::challenge::history::{HistoryItem, Pager};
use crate::challenge::ingest::{ingest_entries, ingest_goal, ingest_group, ingest_members};
use crate::challenge::{derive_view, ChallengeView, Group, GroupId, Viewer};
use crate::goals::progress_query;
use crate::groups::members_query;
use crate::store::subscription::Snapshot;
use crate::store::{collection, DocumentStore, Filter, Query, StoreError, Subscription};

/// One rendering of a group page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedView {
    /// `None` when the group document does not exist.
    pub group: Option<Group>,
    pub view: ChallengeView,
    pub page: usize,
    pub page_count: usize,
    pub page_items: Vec<HistoryItem>,
}

struct Subscriptions {
    group: Subscription,
    members: Subscription,
    goal: Subscription,
    progress: Subscription,
}

impl Subscriptions {
    async fn open(store: &dyn DocumentStore, group_id: &GroupId) -> Result<Self, StoreError> {
        Ok(Self {
            group: store
                .subscribe(
                    Query::collection(collection::GROUPS)
                        .filter(Filter::document_id(group_id.as_str())),
                )
                .await?,
            members: store.subscribe(members_query(group_id)).await?,
            goal: store
                .subscribe(
                    Query::collection(collection::GOALS)
                        .filter(Filter::document_id(group_id.as_str())),
                )
                .await?,
            progress: store.subscribe(progress_query(group_id)).await?,
        })
    }

    fn cancel(self) {
        self.group.cancel();
        self.members.cancel();
        self.goal.cancel();
        self.progress.cancel();
    }
}

#[derive(Default)]
struct Snapshots {
    group: Option<Snapshot>,
    members: Option<Snapshot>,
    goal: Option<Snapshot>,
    progress: Option<Snapshot>,
}

impl Snapshots {
    fn is_complete(&self) -> bool {
        self.group.is_some() && self.members.is_some() && self.goal.is_some() && self.progress.is_some()
    }
}

/// Keeps a group's view current. Every snapshot triggers a full recompute;
/// nothing is patched incrementally.
pub struct GroupFeed {
    store: Arc<dyn DocumentStore>,
    group_id: GroupId,
    subscriptions: Option<Subscriptions>,
    snapshots: Snapshots,
    pager: Pager,
    history_len: usize,
}

impl GroupFeed {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        group_id: GroupId,
        page_size: usize,
    ) -> Result<Self, StoreError> {
        let subscriptions = Subscriptions::open(store.as_ref(), &group_id).await?;
        tracing::debug!(group_id = %group_id, "Group feed opened");
        Ok(Self {
            store,
            group_id,
            subscriptions: Some(subscriptions),
            snapshots: Snapshots::default(),
            pager: Pager::new(page_size),
            history_len: 0,
        })
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// Point the feed at another group. The old subscriptions are torn down
    /// before the new ones are opened, and paging starts over.
    pub async fn switch_group(&mut self, group_id: GroupId) -> Result<(), StoreError> {
        if let Some(old) = self.subscriptions.take() {
            old.cancel();
        }
        self.snapshots = Snapshots::default();
        self.pager = Pager::new(self.pager.page_size());
        self.history_len = 0;
        self.group_id = group_id;

        self.subscriptions = Some(Subscriptions::open(self.store.as_ref(), &self.group_id).await?);
        tracing::debug!(group_id = %self.group_id, "Group feed switched");
        Ok(())
    }

    /// Wait until a subscription delivers something new and return the
    /// recomputed view. `None` once the feed has no live subscriptions.
    pub async fn next_view(&mut self, viewer: Option<&Viewer>) -> Option<FeedView> {
        let subs = self.subscriptions.as_mut()?;
        loop {
            tokio::select! {
                snapshot = subs.group.next() => self.snapshots.group = Some(snapshot?),
                snapshot = subs.members.next() => self.snapshots.members = Some(snapshot?),
                snapshot = subs.goal.next() => self.snapshots.goal = Some(snapshot?),
                snapshot = subs.progress.next() => self.snapshots.progress = Some(snapshot?),
            }
            if self.snapshots.is_complete() {
                break;
            }
        }
        let view = self.current_view(viewer)?;
        self.history_len = view.view.history.len();
        Some(view)
    }

    /// Recompute from the snapshots already received, clamping the page to
    /// the current history length. `None` until every subscription has
    /// delivered once.
    pub fn current_view(&mut self, viewer: Option<&Viewer>) -> Option<FeedView> {
        if !self.snapshots.is_complete() {
            return None;
        }
        let group = self
            .snapshots
            .group
            .as_ref()
            .and_then(|docs| docs.first())
            .map(ingest_group);
        let members = self
            .snapshots
            .members
            .as_deref()
            .map(|docs| ingest_members(docs, &self.group_id))
            .unwrap_or_default();
        let goal = self
            .snapshots
            .goal
            .as_ref()
            .and_then(|docs| docs.first())
            .map(ingest_goal);
        let entries = self
            .snapshots
            .progress
            .as_deref()
            .map(|docs| ingest_entries(docs, &self.group_id))
            .unwrap_or_default();

        let view = derive_view(&entries, goal.as_ref(), &members, viewer);
        let total = view.history.len();
        self.pager.clamp(total);
        self.history_len = total;

        Some(FeedView {
            group,
            page: self.pager.page(),
            page_count: self.pager.page_count(total),
            page_items: self.pager.slice(&view.history).to_vec(),
            view,
        })
    }

    pub fn page(&self) -> usize {
        self.pager.page()
    }

    pub fn next_page(&mut self) {
        self.pager.next(self.history_len);
    }

    pub fn previous_page(&mut self) {
        self.pager.previous();
    }

    pub fn set_page(&mut self, page: usize) {
        self.pager.set_page(page, self.history_len);
    }

    /// Stop listening. Equivalent to dropping the feed.
    pub fn close(mut self) {
        if let Some(subs) = self.subscriptions.take() {
            subs.cancel();
        }
    }
}
