use iced::widget::image::Handle as ImageHandle;
use iced::widget::{button, column, container, row, slider, text, Column, Row};
use iced::{Alignment, Element, Length, Subscription, Task, Theme};
use image::DynamicImage;
use rfd::FileDialog;
use std::path::PathBuf;
use std::time::Duration;

mod camera;
mod observable;
mod state;
mod vision;

use camera::device::{CameraPosition, CapturedPhoto, FocusPoint};
use camera::viewmodel::CameraViewModel;
use observable::Subscription as StateSubscription;
use state::catalog::OutfitCatalog;
use state::data::{ClothingCategory, ClothingPage, ItemImage};
use state::settings::AppSettings;
use state::store::CutoutStore;
use vision::SegmentationEngine;

/// Main application state
struct WardrobeStudio {
    /// Camera session state and permission bridging
    view_model: CameraViewModel,
    /// Cutout creation worker
    engine: SegmentationEngine,
    /// The cutout catalog database
    store: CutoutStore,
    /// Per-category outfit pages
    catalog: OutfitCatalog,
    settings: AppSettings,
    settings_path: Option<PathBuf>,
    /// Status message to display to the user
    status: String,
    /// Preview of the most recent cutout
    cutout_preview: Option<ImageHandle>,

    loading_events: StateSubscription<bool>,
    cutout_events: StateSubscription<Option<image::RgbaImage>>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// Ask for camera access and configure the session
    RequestCameraPermission,
    /// Deferred re-attempt when configuration did not stick
    ConfigureRecheck,
    /// User pressed the shutter button
    CapturePressed,
    /// The one-shot capture completion resolved
    CaptureFinished(Option<CapturedPhoto>),
    /// User picked an existing photo to cut out
    ImportPhoto,
    ImportLoaded(Option<DynamicImage>),
    FlashToggled,
    SwitchCamera,
    Refocus,
    ZoomChanged(f32),
    SelectItem(ClothingCategory, usize),
    NextPage(ClothingCategory),
    PreviousPage(ClothingCategory),
    SwapOutfits,
    CreateOutfit,
    ReloadCatalog,
    /// Drain background observables on the UI thread
    Tick,
}

impl WardrobeStudio {
    /// Create a new instance of the application
    fn new() -> (Self, Task<Message>) {
        let settings_path = AppSettings::default_path();
        let settings = settings_path
            .as_deref()
            .map(AppSettings::load_or_default)
            .unwrap_or_default();

        // If this fails, we panic because the app cannot function
        // without its catalog database
        let store = CutoutStore::open_default()
            .expect("Failed to initialize cutout store. Check permissions and disk space.");

        let cutout_count = store.count().unwrap_or(0);
        println!("🧥 Wardrobe Studio initialized with {} cutouts", cutout_count);

        let catalog = OutfitCatalog::load(&store);
        let engine = SegmentationEngine::new(store.path().clone());
        let loading_events = engine.is_loading.subscribe();
        let cutout_events = engine.cutout.subscribe();

        let mut view_model = CameraViewModel::new();
        view_model.setup_bindings();

        // Apply the persisted camera preferences before configuring
        if settings.camera_position == CameraPosition::Front {
            view_model.switch_camera();
        }
        if settings.flash_on {
            view_model.switch_flash();
        }
        view_model.zoom(settings.zoom_factor);

        let status = format!("Ready. {} cutouts in the catalog.", cutout_count);

        (
            WardrobeStudio {
                view_model,
                engine,
                store,
                catalog,
                settings,
                settings_path,
                status,
                cutout_preview: None,
                loading_events,
                cutout_events,
            },
            Task::done(Message::RequestCameraPermission),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::RequestCameraPermission => {
                self.view_model.request_camera_permission();

                if self.view_model.is_permission_granted {
                    self.status = String::from("Configuring camera...");
                    // One deferred re-attempt if configuration does not stick
                    return Task::perform(delay(Duration::from_millis(500)), |_| {
                        Message::ConfigureRecheck
                    });
                }

                self.status = String::from(
                    "Camera permission denied. Enable camera access in system settings.",
                );
                Task::none()
            }
            Message::ConfigureRecheck => {
                self.view_model.retry_configure_if_needed();
                Task::none()
            }
            Message::CapturePressed => match self.view_model.capture_image() {
                Some(completion) => {
                    self.status = String::from("Capturing...");
                    Task::perform(
                        async move { completion.await.ok().flatten() },
                        Message::CaptureFinished,
                    )
                }
                None => {
                    self.status = String::from(
                        "Photo library access is denied. Enable it in system settings.",
                    );
                    Task::none()
                }
            },
            Message::CaptureFinished(Some(photo)) => {
                self.status = String::from("Photo captured. Creating cutout...");
                self.engine
                    .create_cutout(DynamicImage::ImageRgba8(photo.image));
                Task::none()
            }
            Message::CaptureFinished(None) => {
                self.status = String::from("Capture failed. See the log for details.");
                Task::none()
            }
            Message::ImportPhoto => {
                // Show the native file picker dialog
                let file = FileDialog::new()
                    .set_title("Select a Clothing Photo")
                    .add_filter("Images", &["png", "jpg", "jpeg"])
                    .pick_file();

                if let Some(path) = file {
                    self.status = format!("Importing {}...", path.display());
                    return Task::perform(load_image(path), Message::ImportLoaded);
                }
                Task::none()
            }
            Message::ImportLoaded(Some(image)) => {
                self.status = String::from("Photo imported. Creating cutout...");
                self.engine.create_cutout(image);
                Task::none()
            }
            Message::ImportLoaded(None) => {
                self.status = String::from("Could not load the selected image.");
                Task::none()
            }
            Message::FlashToggled => {
                self.view_model.switch_flash();
                self.settings.flash_on = self.view_model.is_flash_on;
                self.save_settings();
                Task::none()
            }
            Message::SwitchCamera => {
                self.view_model.switch_camera();
                self.settings.camera_position = self.settings.camera_position.flipped();
                self.save_settings();
                Task::none()
            }
            Message::Refocus => {
                self.view_model.set_focus(FocusPoint { x: 0.5, y: 0.5 });
                self.status = String::from("Refocusing at center.");
                Task::none()
            }
            Message::ZoomChanged(factor) => {
                self.view_model.zoom(factor);
                self.settings.zoom_factor = factor;
                self.save_settings();
                Task::none()
            }
            Message::SelectItem(category, index) => {
                self.catalog.select_item(category, index);
                Task::none()
            }
            Message::NextPage(category) => {
                self.catalog.next_page(category);
                Task::none()
            }
            Message::PreviousPage(category) => {
                self.catalog.previous_page(category);
                Task::none()
            }
            Message::SwapOutfits => {
                self.catalog.swap_outfits();
                Task::none()
            }
            Message::CreateOutfit => {
                self.catalog.create_outfit();
                self.status = String::from("Outfit logged.");
                Task::none()
            }
            Message::ReloadCatalog => {
                self.catalog = OutfitCatalog::load(&self.store);
                self.status = String::from("Catalog reloaded.");
                Task::none()
            }
            Message::Tick => {
                self.view_model.pump();

                if self.view_model.show_alert_error {
                    self.status = format!(
                        "{}: {}",
                        self.view_model.alert_error.title, self.view_model.alert_error.message
                    );
                }
                if self.view_model.show_setting_alert {
                    self.status = String::from(
                        "Permission missing. Enable camera and photo access in system settings.",
                    );
                }

                while let Some(loading) = self.loading_events.try_recv() {
                    if loading {
                        self.status = String::from("Creating cutout...");
                    }
                }

                if let Some(Some(cutout)) = self.cutout_events.latest() {
                    self.cutout_preview = Some(ImageHandle::from_rgba(
                        cutout.width(),
                        cutout.height(),
                        cutout.clone().into_raw(),
                    ));
                    self.status = String::from("✅ Cutout saved to the catalog.");
                    // Pick up the new cutout in the tops row
                    self.catalog = OutfitCatalog::load(&self.store);
                }

                Task::none()
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let controls = row![
            button("Capture").on_press(Message::CapturePressed).padding(10),
            button("Import Photo").on_press(Message::ImportPhoto).padding(10),
            button(if self.view_model.is_flash_on {
                "Flash: On"
            } else {
                "Flash: Off"
            })
            .on_press(Message::FlashToggled)
            .padding(10),
            button("Switch Camera").on_press(Message::SwitchCamera).padding(10),
            button("Refocus").on_press(Message::Refocus).padding(10),
        ]
        .spacing(10);

        let outfit_controls = row![
            button("Swap Outfit").on_press(Message::SwapOutfits).padding(10),
            button("Create Outfit").on_press(Message::CreateOutfit).padding(10),
            button("Reload Catalog").on_press(Message::ReloadCatalog).padding(10),
        ]
        .spacing(10);

        let mut content: Column<Message> = column![
            text("Wardrobe Studio").size(40),
            text(format!("Today · {}", self.catalog.weather_temperature)).size(16),
            controls,
            row![
                text("Zoom").size(14),
                slider(1.0..=5.0, self.settings.zoom_factor, Message::ZoomChanged).width(220),
            ]
            .spacing(10)
            .align_y(Alignment::Center),
            outfit_controls,
            text(&self.status).size(16),
        ]
        .spacing(16)
        .padding(30)
        .align_x(Alignment::Center);

        for category in ClothingCategory::all() {
            if let Some(page) = self.catalog.page(category) {
                content = content.push(category_row(category, page));
            }
        }

        if let Some(preview) = &self.cutout_preview {
            content = content.push(
                iced::widget::image(preview.clone()).width(Length::Fixed(200.0)),
            );
        }

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(Duration::from_millis(120)).map(|_| Message::Tick)
    }

    fn save_settings(&self) {
        if let Some(path) = &self.settings_path {
            if let Err(e) = self.settings.save(path) {
                log::warn!("Settings not saved: {e}");
            }
        }
    }
}

/// One browsing row for a clothing category
fn category_row(category: ClothingCategory, page: &ClothingPage) -> Element<'static, Message> {
    let mut items: Row<Message> = Row::new().spacing(8);
    for (index, item) in page.items.iter().enumerate() {
        let label = if index == page.selected_index {
            format!("[{}]", item.name)
        } else {
            item.name.clone()
        };
        items = items.push(
            button(text(label).size(13)).on_press(Message::SelectItem(category, index)),
        );
    }

    // Cutouts carry their own bitmap; show it for the selection
    if let Some(ItemImage::Owned(bitmap)) = page.selected_item().map(|item| &item.image) {
        items = items.push(
            iced::widget::image(ImageHandle::from_rgba(
                bitmap.width(),
                bitmap.height(),
                bitmap.clone().into_raw(),
            ))
            .height(Length::Fixed(category.preferred_height(720.0))),
        );
    }

    column![
        text(format!(
            "{} (page {} of {})",
            category.label(),
            page.current_page,
            page.total_pages
        ))
        .size(15),
        row![
            button("<").on_press(Message::PreviousPage(category)),
            items,
            button(">").on_press(Message::NextPage(category)),
        ]
        .spacing(8)
        .align_y(Alignment::Center),
    ]
    .spacing(4)
    .into()
}

fn main() -> iced::Result {
    env_logger::init();

    iced::application(
        "Wardrobe Studio",
        WardrobeStudio::update,
        WardrobeStudio::view,
    )
    .subscription(WardrobeStudio::subscription)
    .theme(WardrobeStudio::theme)
    .centered()
    .run_with(WardrobeStudio::new)
}

/// Async load of an imported photo
/// Runs on a blocking thread because image decoding is CPU-bound
async fn load_image(path: PathBuf) -> Option<DynamicImage> {
    let result = tokio::task::spawn_blocking(move || image::open(&path)).await;
    match result {
        Ok(Ok(image)) => Some(image),
        Ok(Err(e)) => {
            log::error!("Failed to load image: {e}");
            None
        }
        Err(e) => {
            log::error!("Image load task failed: {e}");
            None
        }
    }
}

async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}
