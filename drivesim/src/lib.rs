pub mod core {
    pub mod boundary;
    pub mod car;
    pub mod driver;
    pub mod frame_log;
    pub mod handle_session;
    pub mod lap_detector;
    pub mod session;
    pub mod track;
}
pub mod interfaces {
    pub mod hud_interface;
    pub mod storage;
}
pub mod post {
    pub mod analysis;
    pub mod run_summary;
    pub mod training_data;
}
pub mod pre {
    pub mod read_sim_pars;
    pub mod sim_opts;
}
