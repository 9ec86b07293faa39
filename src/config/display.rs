/// Banners, date formats and pagination of the web UI.
///
/// Date and time formats use the web framework's format syntax, e.g.
/// "N j, Y" renders as "Jan. 1, 2020".
#[derive(Debug, Clone, serde::Serialize, confique::Config)]
pub struct DisplayConfig {
    /// Banner displayed at the top of every page. May contain HTML.
    #[config(default = "")]
    pub banner_top: String,

    /// Banner displayed at the bottom of every page. May contain HTML.
    #[config(default = "")]
    pub banner_bottom: String,

    /// Text shown on the login page. May contain HTML.
    #[config(default = "")]
    pub banner_login: String,

    #[config(default = "N j, Y")]
    pub date_format: String,

    #[config(default = "N j, Y g:i a")]
    pub datetime_format: String,

    #[config(default = "Y-m-d")]
    pub short_date_format: String,

    #[config(default = "Y-m-d H:i")]
    pub short_datetime_format: String,

    #[config(default = "H:i:s")]
    pub short_time_format: String,

    #[config(default = "g:i a")]
    pub time_format: String,

    /// Default number of objects per page in the UI and the REST API.
    #[config(default = 50)]
    pub paginate_count: u32,

    /// Maximum number of objects the REST API returns per page, even if the
    /// client requests more. Set to 0 to remove the limit.
    #[config(default = 1000)]
    pub max_page_size: u32,

    /// Default height of a rack unit in rack elevations (in pixels).
    #[config(default = 22)]
    pub rack_elevation_default_unit_height: u32,

    /// Default width of a rack unit in rack elevations (in pixels).
    #[config(default = 220)]
    pub rack_elevation_default_unit_width: u32,
}
