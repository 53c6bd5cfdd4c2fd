pub mod commands {
    pub const ADD: &str = "PSM110";
    pub const REMOVE: &str = "PSM111";
    pub const DISABLE: &str = "PSM112";
    pub const SERVICES: &str = "PSM120";
    pub const GENERIC: &str = "PSM000";
}

pub mod service {
    pub const UNKNOWN: &str = "PSM101";
    pub const UNSUPPORTED: &str = "PSM102";
    pub const UNSUPPORTED_OS: &str = "PSM103";
    pub const NO_APPLICATIONS: &str = "PSM104";
}

pub mod access {
    pub const PERMISSION_DENIED: &str = "PSM201";
    pub const ROOT_STORE_REFUSED: &str = "PSM202";
}

pub mod locator {
    pub const INVALID_USER: &str = "PSM301";
    pub const STORE_NOT_FOUND: &str = "PSM302";
    pub const STORE_NOT_OPEN: &str = "PSM303";
}

pub mod schema {
    pub const CREATION_FAILED: &str = "PSM401";
}

pub mod daemon {
    pub const REPAIR_FAILED: &str = "PSM501";
    pub const CONTROL_FAILED: &str = "PSM502";
    pub const NESTED_SESSION: &str = "PSM503";
}

pub mod identity {
    pub const APP_NOT_FOUND: &str = "PSM601";
    pub const MALFORMED_BUNDLE_ID: &str = "PSM602";
    pub const HARDWARE_UNAVAILABLE: &str = "PSM603";
}
