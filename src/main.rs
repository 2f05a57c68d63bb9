fn main() {
    readtrack_lib::run()
}
