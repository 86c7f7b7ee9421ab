#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use content_compendium::app;
use content_compendium::app::file_dialog::NativeDialogService;
use content_compendium::config::{self, Storage};
use std::sync::{Arc, Mutex};
use tao::{
    event::{Event, StartCause, WindowEvent},
    event_loop::{ControlFlow, EventLoopBuilder},
    window::WindowBuilder,
};
use tracing_subscriber::EnvFilter;
use wry::WebViewBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Create the event loop and window
    let event_loop = EventLoopBuilder::<app::events::UserEvent>::with_user_event().build();

    let storage = Storage::from_project_dirs()?;
    tracing::info!("Storing settings in {:?}", storage.root());
    let app_state = app::state::AppState::new(storage);
    let (width, height) = app_state.config.window_size;
    let (pos_x, pos_y) = app_state.config.window_position;

    let window = WindowBuilder::new()
        .with_title("Content Compendium")
        .with_inner_size(tao::dpi::LogicalSize::new(width, height))
        .with_position(tao::dpi::LogicalPosition::new(pos_x, pos_y))
        .with_min_inner_size(tao::dpi::LogicalSize::new(900, 600))
        .build(&event_loop)?;

    let window = Arc::new(window);

    // Create the shared application state and the event loop proxy
    let proxy = event_loop.create_proxy();
    let state = Arc::new(Mutex::new(app_state));
    let dialog_service = Arc::new(NativeDialogService);

    let ipc_handler_state = state.clone();
    let ipc_handler_proxy = proxy.clone();
    let ipc_handler_dialog = dialog_service.clone();
    let ipc_handler = move |message: String| {
        app::handle_ipc_message(
            message,
            ipc_handler_dialog.clone(),
            ipc_handler_proxy.clone(),
            ipc_handler_state.clone(),
        );
    };

    // Dropping a folder on the window opens it.
    let drop_handler_state = state.clone();
    let drop_handler_proxy = proxy.clone();
    let file_drop_handler = move |event| {
        use wry::FileDropEvent;
        if let FileDropEvent::Dropped { paths, .. } = event {
            if let Some(path) = paths.into_iter().find(|p| p.is_dir()) {
                tokio::spawn(app::commands::open_folder(
                    path,
                    drop_handler_proxy.clone(),
                    drop_handler_state.clone(),
                ));
            } else {
                tracing::info!("Ignoring drop without a folder.");
            }
        }
        true
    };

    #[cfg(debug_assertions)]
    let webview_builder = {
        // In debug builds, load from the Vite dev server.
        tracing::info!("Running in DEBUG mode, loading from Vite dev server.");
        WebViewBuilder::new(&*window)
            .with_url("http://localhost:1420")
            .with_devtools(true)
    };

    #[cfg(not(debug_assertions))]
    let webview_builder = {
        tracing::info!("Running in RELEASE mode, loading bundled page.");
        WebViewBuilder::new(&*window)
            .with_html(include_str!("ui/index.html"))
            .with_devtools(false)
    };

    let webview = webview_builder
        .with_ipc_handler(ipc_handler)
        .with_file_drop_handler(file_drop_handler)
        .build()?;

    let state_for_events = state.clone();
    let window_for_events = window.clone();

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        match event {
            Event::NewEvents(StartCause::Init) => {
                tracing::info!("Application initialized.");
            }
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    tracing::info!("Close requested. Saving final window state...");
                    let mut state_guard = app::helpers::lock_state(&state_for_events);
                    let size = window_for_events.inner_size();
                    let position = window_for_events.outer_position().unwrap_or_default();
                    state_guard.config.window_size = (size.width.into(), size.height.into());
                    state_guard.config.window_position = (position.x.into(), position.y.into());
                    state_guard.release_watcher();

                    if let Err(e) = config::settings::save_config(&state_guard.config, &state_guard.storage) {
                        tracing::error!("Failed to save config on exit: {}", e);
                    }
                    *control_flow = ControlFlow::Exit;
                }
                WindowEvent::Resized(size) => {
                    let mut state_guard = app::helpers::lock_state(&state_for_events);
                    state_guard.config.window_size = (size.width.into(), size.height.into());
                }
                WindowEvent::Moved(position) => {
                    let mut state_guard = app::helpers::lock_state(&state_for_events);
                    state_guard.config.window_position = (position.x.into(), position.y.into());
                }
                _ => (),
            },
            Event::UserEvent(user_event) => {
                app::handle_user_event(user_event, &webview);
            }
            _ => (),
        }
    });
}
