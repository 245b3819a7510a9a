//! Player section endpoints: aggregate loads, single sections, forced
//! refreshes and the two SSE feeds.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use statline_core::sections::{
    parse_kind_list, watch_section, CancelFlag, PartialCallback, PlayerKey, PlayerSections,
    Section, SectionKey, SectionKind,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{error::ApiResult, main_lib::AppState};

const SECTION_EVENT: &str = "section";
const AGGREGATE_EVENT: &str = "aggregate";

#[derive(Deserialize)]
struct KindsQuery {
    kinds: Option<String>,
}

/// Aggregate view with the derived `loading` and `error` fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub player_key: PlayerKey,
    pub sections: PlayerSections,
    pub loading: bool,
    pub error: Option<String>,
}

impl AggregateResponse {
    fn new(player_key: PlayerKey, sections: PlayerSections) -> Self {
        Self {
            loading: sections.loading(),
            error: sections.error().map(str::to_string),
            player_key,
            sections,
        }
    }
}

/// One section together with the key it belongs to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionView {
    pub player_key: PlayerKey,
    pub kind: SectionKind,
    #[serde(flatten)]
    pub section: Section,
}

impl SectionView {
    fn new(player_key: PlayerKey, kind: SectionKind, section: Section) -> Self {
        Self {
            player_key,
            kind,
            section,
        }
    }
}

fn parse_target(player: &str, kind: &str) -> ApiResult<(PlayerKey, SectionKind)> {
    Ok((PlayerKey::new(player)?, kind.parse()?))
}

fn parse_kinds(query: &KindsQuery) -> ApiResult<Vec<SectionKind>> {
    Ok(parse_kind_list(query.kinds.as_deref().unwrap_or_default())?)
}

async fn get_sections(
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
    Query(query): Query<KindsQuery>,
) -> ApiResult<Json<AggregateResponse>> {
    let player_key = PlayerKey::new(player)?;
    let kinds = parse_kinds(&query)?;
    let sections = state
        .analytics
        .load(&player_key, &kinds, None, &CancelFlag::new())
        .await;
    Ok(Json(AggregateResponse::new(player_key, sections)))
}

async fn get_section(
    State(state): State<Arc<AppState>>,
    Path((player, kind)): Path<(String, String)>,
) -> ApiResult<Json<SectionView>> {
    let (player_key, kind) = parse_target(&player, &kind)?;
    let section = state.sections.get_section(&player_key, kind).await;
    Ok(Json(SectionView::new(player_key, kind, section)))
}

async fn refresh_section(
    State(state): State<Arc<AppState>>,
    Path((player, kind)): Path<(String, String)>,
) -> ApiResult<Json<SectionView>> {
    let (player_key, kind) = parse_target(&player, &kind)?;
    state.analytics.invalidate(&player_key).await;
    let section = state.sections.refresh_section(&player_key, kind).await;
    Ok(Json(SectionView::new(player_key, kind, section)))
}

enum StreamMessage {
    Section(SectionView),
    Aggregate(AggregateResponse),
}

impl StreamMessage {
    fn into_event(self) -> Option<SseEvent> {
        let (name, payload) = match self {
            StreamMessage::Section(view) => (SECTION_EVENT, SseEvent::default().json_data(view)),
            StreamMessage::Aggregate(aggregate) => {
                (AGGREGATE_EVENT, SseEvent::default().json_data(aggregate))
            }
        };
        match payload {
            Ok(event) => Some(event.event(name)),
            Err(err) => {
                tracing::error!("Failed to serialize SSE payload for {}: {}", name, err);
                None
            }
        }
    }
}

/// Cancels the load once the SSE body is dropped, i.e. the client went away.
struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}

async fn stream_sections(
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
    Query(query): Query<KindsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let player_key = PlayerKey::new(player)?;
    let kinds = parse_kinds(&query)?;
    let cancel = CancelFlag::new();
    let (tx, rx) = mpsc::unbounded_channel::<StreamMessage>();

    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let partial_tx = tx.clone();
        let partial_key = player_key.clone();
        let send_partial = move |kind: SectionKind, section: &Section| {
            // A closed channel means the client left; the cancel flag follows.
            let _ = partial_tx.send(StreamMessage::Section(SectionView::new(
                partial_key.clone(),
                kind,
                section.clone(),
            )));
        };
        let on_partial: PartialCallback<'_> = &send_partial;
        let sections = state
            .analytics
            .load(&player_key, &kinds, Some(on_partial), &task_cancel)
            .await;
        if task_cancel.is_cancelled() {
            tracing::debug!("Section stream for {} closed by the client", player_key);
            return;
        }
        let _ = tx.send(StreamMessage::Aggregate(AggregateResponse::new(
            player_key, sections,
        )));
    });

    let guard = CancelOnDrop(cancel);
    let stream = tokio_stream::StreamExt::filter_map(
        UnboundedReceiverStream::new(rx),
        move |message| {
            let _ = &guard;
            message.into_event().map(Ok)
        },
    );
    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

/// Follows the stored value of one section. Never triggers a refresh.
async fn watch_section_events(
    State(state): State<Arc<AppState>>,
    Path((player, kind)): Path<(String, String)>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let (player_key, kind) = parse_target(&player, &kind)?;
    let updates = watch_section(
        state.repository.clone(),
        SectionKey::new(player_key.clone(), kind),
    );
    let stream = tokio_stream::StreamExt::filter_map(updates, move |section| {
        StreamMessage::Section(SectionView::new(player_key.clone(), kind, section))
            .into_event()
            .map(Ok)
    });
    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/players/{player}/sections", get(get_sections))
        .route("/players/{player}/sections/stream", get(stream_sections))
        .route("/players/{player}/sections/{kind}", get(get_section))
        .route(
            "/players/{player}/sections/{kind}/refresh",
            post(refresh_section),
        )
        .route(
            "/players/{player}/sections/{kind}/watch",
            get(watch_section_events),
        )
}
