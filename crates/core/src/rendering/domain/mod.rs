pub mod draw_surface;
pub mod result_renderer;
