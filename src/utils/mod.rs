pub mod cookie;
pub mod fs;
pub mod mime;
pub mod multipart;
pub mod session;
pub mod set_cookie;
