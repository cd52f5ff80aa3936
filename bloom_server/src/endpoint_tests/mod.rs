mod checkout;
mod helpers;
mod mocks;
mod staff;
