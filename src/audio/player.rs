use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::{NodeOptions, PlayRequest, VoiceBackend};
use super::events::{PlayerEvent, QueueMetadata};
use super::queue::{LoopMode, MusicQueue, QueueInfo};
use super::stream::{enrich, StreamBackend};
use crate::error::PlaybackError;
use crate::sources::Candidate;

/// Track que suena ahora en un guild
#[derive(Clone)]
pub struct NowPlaying {
    pub handle: TrackHandle,
    pub track: Candidate,
}

pub struct AudioPlayer {
    manager: Arc<Songbird>,
    streams: Arc<dyn StreamBackend>,
    queues: Arc<DashMap<GuildId, Arc<RwLock<MusicQueue>>>>,
    current_tracks: Arc<DashMap<GuildId, NowPlaying>>,
    options: Arc<DashMap<GuildId, NodeOptions>>,
    // Un solo arranque de track a la vez por guild
    start_slots: Arc<DashMap<GuildId, Arc<Mutex<()>>>>,
    leave_timers: Arc<DashMap<GuildId, CancellationToken>>,
    events: flume::Sender<PlayerEvent>,
    volume: f32,
    max_queue_size: usize,
}

impl AudioPlayer {
    pub fn new(
        manager: Arc<Songbird>,
        streams: Arc<dyn StreamBackend>,
        events: flume::Sender<PlayerEvent>,
        volume: f32,
        max_queue_size: usize,
    ) -> Self {
        Self {
            manager,
            streams,
            queues: Arc::new(DashMap::new()),
            current_tracks: Arc::new(DashMap::new()),
            options: Arc::new(DashMap::new()),
            start_slots: Arc::new(DashMap::new()),
            leave_timers: Arc::new(DashMap::new()),
            events,
            volume,
            max_queue_size,
        }
    }

    /// Reproduce la siguiente canción en la cola
    pub async fn play_next(&self, guild_id: GuildId) {
        let Some(call) = self.manager.get(guild_id) else {
            debug!("Sin conexión de voz en guild {}, no se avanza la cola", guild_id);
            return;
        };

        let slot = self.slot(guild_id);
        let _slot = slot.lock().await;
        if self.current_tracks.contains_key(&guild_id) {
            return;
        }

        let queue = self.get_or_create_queue(guild_id);
        loop {
            let next_track = queue.write().next_track();

            let Some(track) = next_track else {
                debug!("Cola vacía para guild {}", guild_id);
                if let Some(metadata) = self.metadata(guild_id) {
                    self.emit(PlayerEvent::EmptyQueue { guild_id, metadata });
                }
                self.schedule_leave_on_end(guild_id);
                return;
            };

            match self.start(guild_id, &call, track.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    warn!("⚠️ No se pudo iniciar {}: {:#}", track.title(), e);
                    queue.write().drop_current();
                    if let Some(metadata) = self.metadata(guild_id) {
                        self.emit(PlayerEvent::Error {
                            guild_id,
                            metadata,
                            track,
                            error: e,
                        });
                    }
                }
            }
        }
    }

    /// Salta la canción actual; el handler de fin avanza la cola
    pub fn skip(&self, guild_id: GuildId) -> Option<Candidate> {
        let now = self.current_tracks.get(&guild_id)?.clone();
        let _ = now.handle.stop();
        info!("⏭️ Saltando: {}", now.track.title());
        Some(now.track)
    }

    /// Obtiene información de la canción actual y su posición
    pub async fn now_playing(&self, guild_id: GuildId) -> Option<(Candidate, Duration)> {
        let now = self.current_tracks.get(&guild_id)?.clone();
        let position = now
            .handle
            .get_info()
            .await
            .map(|info| info.position)
            .unwrap_or_default();
        Some((now.track, position))
    }

    /// Obtiene información de la cola
    pub fn get_queue_info(&self, guild_id: GuildId) -> QueueInfo {
        let queue = self.get_or_create_queue(guild_id);
        let q = queue.read();
        q.get_info()
    }

    /// Elimina un track de la cola (índice 0-based)
    pub fn remove(&self, guild_id: GuildId, index: usize) -> Result<Candidate> {
        let queue = self.get_or_create_queue(guild_id);
        let mut q = queue.write();
        Ok(q.remove_track(index)?.track)
    }

    /// Configura el modo loop
    pub fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) {
        let queue = self.get_or_create_queue(guild_id);
        queue.write().set_loop_mode(mode);
    }

    /// Hay un track cargado en el guild
    pub fn has_current(&self, guild_id: GuildId) -> bool {
        self.current_tracks.contains_key(&guild_id)
    }

    /// Canal de voz actual del bot en el guild
    pub async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }

    /// El canal de voz del bot se quedó sin usuarios
    pub fn channel_emptied(&self, guild_id: GuildId) {
        let Some(options) = self.options.get(&guild_id).map(|o| o.clone()) else {
            return;
        };
        if options.leave_on_empty {
            info!("👻 Canal vacío en guild {}, saliendo en {:?}", guild_id, options.leave_on_empty_cooldown);
            self.schedule_leave(guild_id, options.leave_on_empty_cooldown, false);
        }
    }

    /// Alguien volvió al canal
    pub fn channel_occupied(&self, guild_id: GuildId) {
        self.cancel_leave(guild_id);
    }

    /// Limpia el estado local tras una desconexión externa
    pub fn forget(&self, guild_id: GuildId) {
        self.cancel_leave(guild_id);
        if let Some((_, now)) = self.current_tracks.remove(&guild_id) {
            let _ = now.handle.stop();
        }
        if let Some((_, queue)) = self.queues.remove(&guild_id) {
            queue.write().clear();
        }
        self.options.remove(&guild_id);
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<Mutex<Call>>> {
        if let Some(call) = self.manager.get(guild_id) {
            let current = call.lock().await.current_channel();
            if current == Some(channel_id.into()) {
                return Ok(call);
            }
        }

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::Connection(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("⚠️ No se pudo ensordecer al bot: {}", e);
            }
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(call)
    }

    async fn start(&self, guild_id: GuildId, call: &Arc<Mutex<Call>>, track: Candidate) -> Result<()> {
        let input = self.streams.fetch_stream(&track).await?;

        let handle = {
            let mut handler = call.lock().await;
            handler.play_input(input)
        };
        let _ = handle.set_volume(self.volume);

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinishHandler {
                        player: self.clone(),
                        guild_id,
                        handle: handle.clone(),
                    },
                )
                .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;
        }

        // Los errores de extracción aparecen aquí, no en play_input
        if let Err(e) = handle.make_playable_async().await {
            let _ = handle.stop();
            return Err(enrich(&track, format!("{:?}", e)).into());
        }

        info!("🎵 Reproduciendo: {}", track.title());
        self.current_tracks.insert(
            guild_id,
            NowPlaying {
                handle,
                track: track.clone(),
            },
        );

        if let Some(metadata) = self.metadata(guild_id) {
            self.emit(PlayerEvent::Start {
                guild_id,
                metadata,
                track,
            });
        }
        Ok(())
    }

    async fn on_track_finished(&self, guild_id: GuildId, handle: &TrackHandle, failure: Option<String>) {
        let Some((_, now)) = self
            .current_tracks
            .remove_if(&guild_id, |_, np| np.handle.uuid() == handle.uuid())
        else {
            debug!("Evento de un track ya reemplazado en guild {}", guild_id);
            return;
        };

        if let Some(metadata) = self.metadata(guild_id) {
            match failure {
                Some(message) => {
                    error!("❌ Error en track {}: {}", now.track.title(), message);
                    self.get_or_create_queue(guild_id).write().drop_current();
                    self.emit(PlayerEvent::Error {
                        guild_id,
                        metadata,
                        track: now.track,
                        error: anyhow::anyhow!(message),
                    });
                }
                None => self.emit(PlayerEvent::End {
                    guild_id,
                    metadata,
                    track: now.track,
                }),
            }
        }

        self.play_next(guild_id).await;
    }

    fn schedule_leave_on_end(&self, guild_id: GuildId) {
        let Some(options) = self.options.get(&guild_id).map(|o| o.clone()) else {
            return;
        };
        if options.leave_on_end {
            self.schedule_leave(guild_id, options.leave_on_end_cooldown, true);
        }
    }

    fn schedule_leave(&self, guild_id: GuildId, delay: Duration, only_if_idle: bool) {
        let token = CancellationToken::new();
        if let Some(previous) = self.leave_timers.insert(guild_id, token.clone()) {
            previous.cancel();
        }

        let player = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if only_if_idle && player.is_playing(guild_id).await {
                        return;
                    }
                    info!("👋 Saliendo del canal de voz en guild {}", guild_id);
                    player.teardown(guild_id).await;
                }
            }
        });
    }

    fn cancel_leave(&self, guild_id: GuildId) {
        if let Some((_, token)) = self.leave_timers.remove(&guild_id) {
            token.cancel();
        }
    }

    fn metadata(&self, guild_id: GuildId) -> Option<QueueMetadata> {
        self.options.get(&guild_id).map(|o| o.metadata.clone())
    }

    fn emit(&self, event: PlayerEvent) {
        if let Err(e) = self.events.send(event) {
            debug!("Canal de eventos cerrado: {}", e);
        }
    }

    fn slot(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.start_slots.entry(guild_id).or_default().clone()
    }

    fn get_or_create_queue(&self, guild_id: GuildId) -> Arc<RwLock<MusicQueue>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| Arc::new(RwLock::new(MusicQueue::new(self.max_queue_size))))
            .clone()
    }
}

#[async_trait]
impl VoiceBackend for AudioPlayer {
    /// Reproduce una canción en el canal de voz, o la encola si ya hay algo sonando
    async fn play(&self, request: &PlayRequest, candidate: &Candidate) -> Result<Candidate> {
        let guild_id = request.guild_id;
        self.options.insert(guild_id, request.node_options.clone());
        self.cancel_leave(guild_id);

        let call = self.connect(guild_id, request.voice_channel).await?;

        let slot = self.slot(guild_id);
        let _slot = slot.lock().await;

        // Un teardown mientras esperábamos el slot deja la llamada huérfana
        if self.manager.get(guild_id).is_none() {
            return Err(PlaybackError::SessionGone(guild_id).into());
        }

        let busy = self.current_tracks.contains_key(&guild_id);
        let queue = self.get_or_create_queue(guild_id);
        queue.write().add_track(candidate.clone())?;

        self.emit(PlayerEvent::TrackAdd {
            guild_id,
            metadata: request.node_options.metadata.clone(),
            track: candidate.clone(),
            queue_was_empty: !busy,
        });

        if busy {
            return Ok(candidate.clone());
        }

        let next_track = queue.write().next_track();
        let track = next_track.ok_or_else(|| anyhow::anyhow!("La cola quedó vacía al iniciar"))?;

        if let Err(e) = self.start(guild_id, &call, track.clone()).await {
            queue.write().drop_current();
            return Err(e);
        }
        Ok(track)
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.manager.get(guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    /// Verifica si hay algo reproduciéndose
    async fn is_playing(&self, guild_id: GuildId) -> bool {
        let Some(now) = self.current_tracks.get(&guild_id).map(|n| n.clone()) else {
            return false;
        };
        match now.handle.get_info().await {
            Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    /// Detiene la reproducción, limpia la cola y sale del canal
    async fn teardown(&self, guild_id: GuildId) {
        self.forget(guild_id);

        if self.manager.get(guild_id).is_some() {
            if let Err(e) = self.manager.remove(guild_id).await {
                warn!("⚠️ Error al salir del canal de voz: {}", e);
            }
        }
        info!("⏹️ Sesión de voz cerrada en guild {}", guild_id);
    }
}

// Implementar Clone manualmente para AudioPlayer
impl Clone for AudioPlayer {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            streams: self.streams.clone(),
            queues: self.queues.clone(),
            current_tracks: self.current_tracks.clone(),
            options: self.options.clone(),
            start_slots: self.start_slots.clone(),
            leave_timers: self.leave_timers.clone(),
            events: self.events.clone(),
            volume: self.volume,
            max_queue_size: self.max_queue_size,
        }
    }
}

/// Handler para cuando termina o falla una canción
struct TrackFinishHandler {
    player: AudioPlayer,
    guild_id: GuildId,
    handle: TrackHandle,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let failure = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        debug!("Track terminado en guild {}, avanzando cola", self.guild_id);
        self.player
            .on_track_finished(self.guild_id, &self.handle, failure)
            .await;

        None
    }
}
