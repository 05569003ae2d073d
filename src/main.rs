mod app;

use app::*;
use leptos::prelude::*;

fn main() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).expect("failed to initialize logger");
    log::info!("notas-ui starting");
    mount_to_body(|| {
        view! {
            <App/>
        }
    })
}
