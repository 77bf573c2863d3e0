//! Twin Desktop: application entry.

mod app;

use eframe::egui;

fn main() -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([800.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Digital Twin",
        options,
        Box::new(|cc| Box::new(app::TwinApp::new(cc))),
    )
}
