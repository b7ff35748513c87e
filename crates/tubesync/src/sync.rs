use std::collections::HashSet;
use std::fmt;

use crate::model::{
    Channel, ChannelId, EntityKind, EntityRef, Playlist, PlaylistId, Video, VideoId,
};
use crate::page::PageWalker;
use crate::sink::{CatalogSink, SinkError};
use crate::source::{CatalogSource, MAX_PAGE_SIZE, SourceError};

/// Where a sync run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Init,
    FetchChannel,
    FetchUploadsPlaylist,
    FetchPlaylists,
    EnumerateVideoIds,
    FetchVideos,
    Persist,
    Done,
    Failed,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::FetchChannel => "fetch channel",
            Self::FetchUploadsPlaylist => "fetch uploads playlist",
            Self::FetchPlaylists => "fetch playlists",
            Self::EnumerateVideoIds => "enumerate video ids",
            Self::FetchVideos => "fetch videos",
            Self::Persist => "persist",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Number of entities per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistCounts {
    pub channels: u64,
    pub playlists: u64,
    pub videos: u64,
    pub playlist_videos: u64,
    pub live_streaming_details: u64,
}

impl PersistCounts {
    fn record(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Channel => self.channels += 1,
            EntityKind::Playlist => self.playlists += 1,
            EntityKind::Video => self.videos += 1,
            EntityKind::PlaylistVideo => self.playlist_videos += 1,
            EntityKind::LiveStreamingDetails => self.live_streaming_details += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.channels
            + self.playlists
            + self.videos
            + self.playlist_videos
            + self.live_streaming_details
    }
}

impl fmt::Display for PersistCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} channels, {} playlists, {} videos, {} playlist videos, {} live streaming details",
            self.channels,
            self.playlists,
            self.videos,
            self.playlist_videos,
            self.live_streaming_details
        )
    }
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub channel_id: ChannelId,
    pub uploads_playlist_id: PlaylistId,
    /// Video ids enumerated from the uploads playlist.
    pub video_ids: usize,
    /// `list_videos` walks issued, one per batch of ids.
    pub video_batches: usize,
    /// Rows written by this run.
    pub created: PersistCounts,
    /// Rows that were already present and left untouched.
    pub existing: PersistCounts,
    /// Memberships of non-uploads playlists that point at videos outside
    /// this channel's uploads, and were therefore not stored.
    pub skipped_playlist_videos: u64,
    pub stage: SyncStage,
}

/// Errors that end a sync run. The store keeps whatever was written before
/// the failure; running the sync again picks up from there.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync failed at {stage} ({entity}): {error}")]
    Source {
        stage: SyncStage,
        entity: EntityRef,
        #[source]
        error: SourceError,
    },

    #[error("sync failed at {stage} writing {entity} after persisting {persisted}: {error}")]
    Sink {
        stage: SyncStage,
        entity: EntityRef,
        persisted: PersistCounts,
        #[source]
        error: SinkError,
    },
}

impl SyncError {
    pub fn stage(&self) -> SyncStage {
        match self {
            Self::Source { stage, .. } | Self::Sink { stage, .. } => *stage,
        }
    }

    pub fn entity(&self) -> &EntityRef {
        match self {
            Self::Source { entity, .. } | Self::Sink { entity, .. } => entity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Video ids per `list_videos` walk. Clamped to `1..=MAX_PAGE_SIZE`.
    pub batch_size: usize,
    /// Also sync the channel's other playlists and their memberships.
    pub include_playlists: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: MAX_PAGE_SIZE,
            include_playlists: false,
        }
    }
}

/// Copies one channel's catalog from a source into a sink.
///
/// A run walks `FetchChannel → FetchUploadsPlaylist → [FetchPlaylists] →
/// EnumerateVideoIds → FetchVideos → Persist` and ends in `Done`, or fails
/// with the stage it reached. Writes go channel, playlists, videos,
/// memberships, then any live details still missing. A `Conflict` from the
/// sink means the row is already there and is counted as existing, so
/// repeated runs converge.
pub struct Synchronizer<S, K> {
    source: S,
    sink: K,
    walker: PageWalker,
    options: SyncOptions,
}

impl<S: CatalogSource, K: CatalogSink> Synchronizer<S, K> {
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            walker: PageWalker::default(),
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_walker(mut self, walker: PageWalker) -> Self {
        self.walker = walker;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub async fn run(&self, channel_id: &ChannelId) -> Result<SyncReport, SyncError> {
        let mut run = Run::new(channel_id);

        run.enter(SyncStage::FetchChannel);
        let channel = self
            .source
            .get_channel(channel_id)
            .await
            .map_err(|e| run.source_failed(EntityRef::channel(channel_id), e))?;

        // The channel already names its uploads playlist; no second lookup.
        run.enter(SyncStage::FetchUploadsPlaylist);
        let uploads = Playlist::uploads_of(&channel);

        let mut playlists = Vec::new();
        if self.options.include_playlists {
            run.enter(SyncStage::FetchPlaylists);
            playlists = self
                .fetch_playlists(&channel, &uploads)
                .await
                .map_err(|(entity, e)| run.source_failed(entity, e))?;
        }

        run.enter(SyncStage::EnumerateVideoIds);
        let video_ids = self
            .list_all_video_ids(&uploads.id)
            .await
            .map_err(|e| run.source_failed(EntityRef::playlist(&uploads.id), e))?;
        tracing::info!(count = video_ids.len(), playlist = %uploads.id, "enumerated uploads");

        run.enter(SyncStage::FetchVideos);
        let (videos, video_batches) = self
            .fetch_videos(&video_ids)
            .await
            .map_err(|(entity, e)| run.source_failed(entity, e))?;

        run.enter(SyncStage::Persist);
        self.persist(&mut run, &channel, &uploads, &video_ids, &videos, &playlists)
            .await?;

        run.enter(SyncStage::Done);
        tracing::info!(
            created = %run.created,
            existing = run.existing.total(),
            "sync finished"
        );

        Ok(SyncReport {
            channel_id: channel.id,
            uploads_playlist_id: uploads.id,
            video_ids: video_ids.len(),
            video_batches,
            created: run.created,
            existing: run.existing,
            skipped_playlist_videos: run.skipped_playlist_videos,
            stage: run.stage,
        })
    }

    async fn list_all_video_ids(
        &self,
        playlist_id: &PlaylistId,
    ) -> Result<Vec<VideoId>, SourceError> {
        let source = &self.source;
        self.walker
            .collect("playlist items", move |token| async move {
                source.list_video_ids(playlist_id, token.as_ref()).await
            })
            .await
    }

    /// The channel's playlists other than uploads, each with its video ids.
    async fn fetch_playlists(
        &self,
        channel: &Channel,
        uploads: &Playlist,
    ) -> Result<Vec<(Playlist, Vec<VideoId>)>, (EntityRef, SourceError)> {
        let source = &self.source;
        let channel_id = &channel.id;
        let listed = self
            .walker
            .collect("playlists", move |token| async move {
                source.list_playlists(channel_id, token.as_ref()).await
            })
            .await
            .map_err(|e| (EntityRef::channel(channel_id), e))?;

        let mut playlists = Vec::with_capacity(listed.len());
        for playlist in listed.into_iter().filter(|p| p.id != uploads.id) {
            let video_ids = self
                .list_all_video_ids(&playlist.id)
                .await
                .map_err(|e| (EntityRef::playlist(&playlist.id), e))?;
            playlists.push((playlist, video_ids));
        }

        tracing::info!(count = playlists.len(), channel = %channel_id, "fetched playlists");
        Ok(playlists)
    }

    /// Fetch full videos in batches, preserving batch and page order.
    async fn fetch_videos(
        &self,
        video_ids: &[VideoId],
    ) -> Result<(Vec<Video>, usize), (EntityRef, SourceError)> {
        let batch_size = self.options.batch_size.clamp(1, MAX_PAGE_SIZE);
        let source = &self.source;
        let mut videos = Vec::with_capacity(video_ids.len());
        let mut batches = 0;

        for (index, batch) in video_ids.chunks(batch_size).enumerate() {
            let fetched = self
                .walker
                .collect("videos", move |token| async move {
                    source.list_videos(batch, token.as_ref()).await
                })
                .await
                .map_err(|e| (batch_ref(index, batch), e))?;

            tracing::debug!(
                batch = index + 1,
                requested = batch.len(),
                fetched = fetched.len(),
                "fetched video batch"
            );
            videos.extend(fetched);
            batches += 1;
        }

        Ok((videos, batches))
    }

    async fn persist(
        &self,
        run: &mut Run,
        channel: &Channel,
        uploads: &Playlist,
        video_ids: &[VideoId],
        videos: &[Video],
        playlists: &[(Playlist, Vec<VideoId>)],
    ) -> Result<(), SyncError> {
        let sink = &self.sink;

        run.record(EntityRef::channel(&channel.id), sink.create_channel(channel).await)?;

        run.record(
            EntityRef::playlist(&uploads.id),
            sink.create_playlist(&channel.id, uploads).await,
        )?;
        for (playlist, _) in playlists {
            run.record(
                EntityRef::playlist(&playlist.id),
                sink.create_playlist(&channel.id, playlist).await,
            )?;
        }

        // Videos that already existed may still lack live details written
        // by an earlier run that saw the broadcast before it ended.
        let mut pending_details = Vec::new();
        for video in videos {
            let created = run.record(EntityRef::video(&video.id), sink.create_video(video).await)?;
            match (&video.live_streaming_details, created) {
                (Some(_), true) => run.created.record(EntityKind::LiveStreamingDetails),
                (Some(details), false) => pending_details.push((&video.id, details)),
                (None, _) => {}
            }
        }

        let fetched: HashSet<&VideoId> = videos.iter().map(|v| &v.id).collect();
        for video_id in video_ids {
            if !fetched.contains(video_id) {
                tracing::warn!(video = %video_id, "listed in uploads but not returned by the source");
                continue;
            }
            run.record(
                EntityRef::playlist_video(&uploads.id, video_id),
                sink.create_playlist_video(&uploads.id, video_id).await,
            )?;
        }

        for (playlist, members) in playlists {
            for video_id in members {
                if !fetched.contains(video_id) {
                    run.skipped_playlist_videos += 1;
                    continue;
                }
                run.record(
                    EntityRef::playlist_video(&playlist.id, video_id),
                    sink.create_playlist_video(&playlist.id, video_id).await,
                )?;
            }
        }

        for (video_id, details) in pending_details {
            run.record(
                EntityRef::live_streaming_details(video_id),
                sink.create_live_streaming_details(video_id, details).await,
            )?;
        }

        Ok(())
    }
}

fn batch_ref(index: usize, batch: &[VideoId]) -> EntityRef {
    let span = match (batch.first(), batch.last()) {
        (Some(first), Some(last)) => format!("batch {} ({first}..{last})", index + 1),
        _ => format!("batch {}", index + 1),
    };
    EntityRef::new(EntityKind::Video, span)
}

/// Bookkeeping for one run.
struct Run {
    channel_id: ChannelId,
    stage: SyncStage,
    created: PersistCounts,
    existing: PersistCounts,
    skipped_playlist_videos: u64,
}

impl Run {
    fn new(channel_id: &ChannelId) -> Self {
        Self {
            channel_id: channel_id.clone(),
            stage: SyncStage::Init,
            created: PersistCounts::default(),
            existing: PersistCounts::default(),
            skipped_playlist_videos: 0,
        }
    }

    fn enter(&mut self, stage: SyncStage) {
        tracing::info!(channel = %self.channel_id, from = %self.stage, to = %stage, "sync stage");
        self.stage = stage;
    }

    fn source_failed(&mut self, entity: EntityRef, error: SourceError) -> SyncError {
        let stage = self.stage;
        tracing::error!(channel = %self.channel_id, %stage, %entity, %error, "sync failed");
        self.stage = SyncStage::Failed;
        SyncError::Source {
            stage,
            entity,
            error,
        }
    }

    /// Count a create result. Returns whether the row was new.
    fn record(
        &mut self,
        entity: EntityRef,
        result: Result<(), SinkError>,
    ) -> Result<bool, SyncError> {
        match result {
            Ok(()) => {
                self.created.record(entity.kind);
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(%entity, "already stored");
                self.existing.record(entity.kind);
                Ok(false)
            }
            Err(error) => {
                let stage = self.stage;
                tracing::error!(
                    channel = %self.channel_id,
                    %stage,
                    %entity,
                    persisted = %self.created,
                    %error,
                    "sync failed"
                );
                self.stage = SyncStage::Failed;
                Err(SyncError::Sink {
                    stage,
                    entity,
                    persisted: self.created.clone(),
                    error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{
        InMemorySink, InMemorySource, SourceCalls, sample_channel, sample_live_video,
        sample_video,
    };

    use super::*;

    fn channel_with_videos(count: usize) -> InMemorySource {
        let videos = (0..count).map(|i| sample_video(&format!("v{i:03}"))).collect();
        let mut source = InMemorySource::new();
        source.add_channel(sample_channel("C1"), videos);
        source
    }

    fn c1() -> ChannelId {
        ChannelId::new("C1")
    }

    #[tokio::test]
    async fn syncs_a_full_channel_in_batches() {
        let source = channel_with_videos(120);
        let sync = Synchronizer::new(source, InMemorySink::new());

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.stage, SyncStage::Done);
        assert_eq!(report.video_ids, 120);
        assert_eq!(report.video_batches, 3);
        assert_eq!(sync.source().video_batches(), vec![50, 50, 20]);
        assert_eq!(SourceCalls::count(&sync.source().calls().get_channel), 1);
        assert_eq!(SourceCalls::count(&sync.source().calls().list_video_ids), 3);
        assert_eq!(
            report.created,
            PersistCounts {
                channels: 1,
                playlists: 1,
                videos: 120,
                playlist_videos: 120,
                live_streaming_details: 0,
            }
        );

        let stored = sync
            .sink()
            .list_video_ids_by_playlist(&PlaylistId::new("UUC1"))
            .await
            .unwrap();
        let expected: Vec<VideoId> = (0..120).map(|i| VideoId::new(format!("v{i:03}"))).collect();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn second_run_writes_nothing_new() {
        let sync = Synchronizer::new(channel_with_videos(7), InMemorySink::new());
        sync.run(&c1()).await.unwrap();
        let writes = sync.sink().writes();

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.stage, SyncStage::Done);
        assert_eq!(report.created.total(), 0);
        assert_eq!(report.existing.videos, 7);
        assert_eq!(report.existing.playlist_videos, 7);
        assert_eq!(sync.sink().writes(), writes);
    }

    #[tokio::test]
    async fn smaller_batch_size_issues_more_walks() {
        let sync = Synchronizer::new(channel_with_videos(45), InMemorySink::new()).with_options(
            SyncOptions {
                batch_size: 20,
                ..SyncOptions::default()
            },
        );

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.video_batches, 3);
        assert_eq!(sync.source().video_batches(), vec![20, 20, 5]);
    }

    #[tokio::test]
    async fn empty_channel_persists_channel_and_uploads_only() {
        let sync = Synchronizer::new(channel_with_videos(0), InMemorySink::new());

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.video_batches, 0);
        assert_eq!(report.created.channels, 1);
        assert_eq!(report.created.playlists, 1);
        assert_eq!(report.created.videos, 0);
        assert_eq!(SourceCalls::count(&sync.source().calls().list_videos), 0);
    }

    #[tokio::test]
    async fn unknown_channel_fails_at_fetch_channel() {
        let sync = Synchronizer::new(InMemorySource::new(), InMemorySink::new());

        let err = sync.run(&c1()).await.unwrap_err();

        assert_eq!(err.stage(), SyncStage::FetchChannel);
        assert_eq!(err.entity(), &EntityRef::channel(&c1()));
        assert!(matches!(
            err,
            SyncError::Source {
                error: SourceError::NotFound { .. },
                ..
            }
        ));
        assert_eq!(sync.sink().writes(), 0);
    }

    #[tokio::test]
    async fn cyclic_uploads_listing_fails_at_enumeration() {
        let mut source = channel_with_videos(3);
        source.make_cyclic(&PlaylistId::new("UUC1"));
        let sync = Synchronizer::new(source, InMemorySink::new());

        let err = sync.run(&c1()).await.unwrap_err();

        assert_eq!(err.stage(), SyncStage::EnumerateVideoIds);
        assert!(matches!(
            err,
            SyncError::Source {
                error: SourceError::Protocol(_),
                ..
            }
        ));
        assert_eq!(sync.sink().writes(), 0);
    }

    #[tokio::test]
    async fn unconvertible_video_names_its_batch() {
        let mut source = channel_with_videos(120);
        source.break_video(&VideoId::new("v060"));
        let sync = Synchronizer::new(source, InMemorySink::new());

        let err = sync.run(&c1()).await.unwrap_err();

        assert_eq!(err.stage(), SyncStage::FetchVideos);
        assert_eq!(err.entity().kind, EntityKind::Video);
        assert!(err.entity().id.starts_with("batch 2"), "{}", err.entity());
        assert!(matches!(
            err,
            SyncError::Source {
                error: SourceError::Conversion { .. },
                ..
            }
        ));
        assert_eq!(sync.sink().writes(), 0);
    }

    #[tokio::test]
    async fn sink_failure_reports_progress_and_rerun_recovers() {
        let sync = Synchronizer::new(channel_with_videos(10), InMemorySink::new());
        sync.sink().fail_writes_of(EntityKind::PlaylistVideo);

        let err = sync.run(&c1()).await.unwrap_err();

        assert_eq!(err.stage(), SyncStage::Persist);
        assert_eq!(err.entity().kind, EntityKind::PlaylistVideo);
        let SyncError::Sink { persisted, .. } = &err else {
            panic!("expected a sink error, got {err:?}");
        };
        assert_eq!(persisted.videos, 10);
        assert_eq!(persisted.playlist_videos, 0);

        sync.sink().heal();
        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.existing.videos, 10);
        assert_eq!(report.created.playlist_videos, 10);
        assert_eq!(sync.sink().row_counts().playlist_videos, 10);
    }

    #[tokio::test]
    async fn videos_missing_from_the_source_are_not_linked() {
        let mut source = channel_with_videos(2);
        let uploads = Playlist::uploads_of(&sample_channel("C1"));
        source.add_playlist(
            &c1(),
            uploads,
            vec![
                VideoId::new("v000"),
                VideoId::new("gone"),
                VideoId::new("v001"),
            ],
        );
        let sync = Synchronizer::new(source, InMemorySink::new());

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.video_ids, 3);
        assert_eq!(report.created.videos, 2);
        assert_eq!(report.created.playlist_videos, 2);
    }

    #[tokio::test]
    async fn includes_other_playlists_when_asked() {
        let mut source = channel_with_videos(3);
        let favourites = Playlist {
            id: PlaylistId::new("PL1"),
            is_uploads: false,
            title: Some("Favourites".into()),
        };
        source.add_playlist(
            &c1(),
            favourites,
            vec![
                VideoId::new("v002"),
                VideoId::new("elsewhere"),
                VideoId::new("v000"),
            ],
        );
        let sync = Synchronizer::new(source, InMemorySink::new()).with_options(SyncOptions {
            include_playlists: true,
            ..SyncOptions::default()
        });

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.created.playlists, 2);
        assert_eq!(report.created.playlist_videos, 5);
        assert_eq!(report.skipped_playlist_videos, 1);
        assert_eq!(
            sync.sink()
                .list_video_ids_by_playlist(&PlaylistId::new("PL1"))
                .await
                .unwrap(),
            vec![VideoId::new("v002"), VideoId::new("v000")]
        );
    }

    #[tokio::test]
    async fn other_playlists_are_skipped_by_default() {
        let mut source = channel_with_videos(1);
        source.add_playlist(
            &c1(),
            Playlist {
                id: PlaylistId::new("PL1"),
                is_uploads: false,
                title: None,
            },
            vec![VideoId::new("v000")],
        );
        let sync = Synchronizer::new(source, InMemorySink::new());

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.created.playlists, 1);
        assert_eq!(SourceCalls::count(&sync.source().calls().list_playlists), 0);
    }

    #[tokio::test]
    async fn live_details_are_stored_with_new_videos() {
        let mut source = InMemorySource::new();
        source.add_channel(
            sample_channel("C1"),
            vec![sample_video("plain"), sample_live_video("live")],
        );
        let sync = Synchronizer::new(source, InMemorySink::new());

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.created.live_streaming_details, 1);
        assert!(
            sync.sink()
                .get_live_streaming_details(&VideoId::new("live"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn live_details_are_added_to_videos_stored_earlier() {
        let sink = InMemorySink::new();
        sink.create_channel(&sample_channel("C1")).await.unwrap();
        sink.create_video(&sample_video("live")).await.unwrap();

        let mut source = InMemorySource::new();
        source.add_channel(sample_channel("C1"), vec![sample_live_video("live")]);
        let sync = Synchronizer::new(source, sink);

        let report = sync.run(&c1()).await.unwrap();

        assert_eq!(report.existing.videos, 1);
        assert_eq!(report.created.live_streaming_details, 1);
        let stored = sync.sink().get_video(&VideoId::new("live")).await.unwrap();
        assert_eq!(stored, sample_live_video("live"));
    }
}
