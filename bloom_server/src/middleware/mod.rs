mod acl;

pub use acl::{StaffAccess, StaffKeyMiddlewareFactory, StaffKeyMiddlewareService, STAFF_KEY_HEADER};
